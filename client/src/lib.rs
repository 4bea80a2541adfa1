//! # Chat Client Library
//!
//! Terminal client for the chat server. It has no protocol logic of its own:
//! every line typed on stdin goes to the server unchanged, and every line the
//! server sends is printed. The session ends when the server answers with the
//! terminal `quit` line or closes the connection.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection setup and the two relay directions:
//! - stdin lines to the socket, one `\n`-terminated write per line
//! - server lines to stdout, stopping after `quit`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chat_client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:8000").await?;
//!     client.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

pub mod network;
