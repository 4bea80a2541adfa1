use chat_shared::QUIT_KEYWORD;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        info!("Connected to {}", addr);
        Ok(Self { stream })
    }

    /// Relays `input` lines to the server and server lines to `output`
    ///
    /// Returns once the server sends `quit` or hangs up. When `input` runs
    /// dry the client asks to leave with `quit` and waits for the server's
    /// answer.
    pub async fn run<I, O>(self, input: I, mut output: O) -> Result<(), ClientError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = self.stream.into_split();
        let mut server_lines = BufReader::new(read_half).lines();
        let mut input_lines = BufReader::new(input).lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                line = server_lines.next_line() => {
                    let Some(line) = line? else {
                        info!("Server closed the connection");
                        break;
                    };
                    output.write_all(line.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                    if line == QUIT_KEYWORD {
                        break;
                    }
                }
                line = input_lines.next_line(), if input_open => {
                    let line = line?.unwrap_or_else(|| {
                        debug!("Input closed, leaving");
                        QUIT_KEYWORD.to_string()
                    });
                    write_half.write_all(line.as_bytes()).await?;
                    write_half.write_all(b"\n").await?;
                    if line.trim() == QUIT_KEYWORD {
                        input_open = false;
                    }
                }
            }
        }

        Ok(())
    }
}
