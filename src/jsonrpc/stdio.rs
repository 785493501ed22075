use std::cell::RefCell;
use std::io;
use std::process::Stdio;
use std::rc::Rc;

use regex::Regex;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use super::channel::{Channel, ChannelError, MessageListener, SharedListener};
use super::error::RpcResult;

/// How long `shutdown` waits for the child before killing it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Largest `Content-Length` accepted from a peer (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Wrap a payload in an LSP-style `Content-Length` frame
pub fn frame(payload: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload)
}

/// Write one framed payload and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &str) -> io::Result<()> {
    writer.write_all(frame(payload).as_bytes()).await?;
    writer.flush().await
}

/// Reads `Content-Length` framed payloads
pub struct FrameReader<R> {
    reader: R,
    header_regex: Regex,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> io::Result<Self> {
        let header_regex = Regex::new(r"^Content-Length:\s*(\d+)\s*$")
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self {
            reader,
            header_regex,
        })
    }

    /// Next payload, or `None` at EOF
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        let mut line_buffer = String::new();

        // Content-Lengthヘッダーを読み取り
        let content_length = loop {
            line_buffer.clear();
            if self.reader.read_line(&mut line_buffer).await? == 0 {
                return Ok(None);
            }

            let header_line = line_buffer.trim();
            if header_line.is_empty() {
                continue;
            }

            let length = self
                .header_regex
                .captures(header_line)
                .and_then(|captures| captures.get(1))
                .and_then(|length| length.as_str().parse::<usize>().ok());
            match length {
                Some(length) if length > MAX_FRAME_SIZE => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Content-Length {} exceeds limit of {} bytes",
                            length, MAX_FRAME_SIZE
                        ),
                    ))
                }
                Some(length) => break length,
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Expected Content-Length header, got: {}", header_line),
                    ))
                }
            }
        };

        // 空行をスキップ
        line_buffer.clear();
        self.reader.read_line(&mut line_buffer).await?;

        // JSONペイロードを読み取り
        let mut buffer = vec![0u8; content_length];
        self.reader.read_exact(&mut buffer).await?;

        String::from_utf8(buffer)
            .map(Some)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
    }
}

/// Channel to a child process speaking framed JSON-RPC on stdin/stdout
///
/// Reader and writer run as local tasks, so the channel must be created
/// inside a `tokio::task::LocalSet`. The child's stderr is inherited.
pub struct ChildProcessChannel {
    outbound_tx: RefCell<Option<mpsc::UnboundedSender<String>>>,
    listener: SharedListener,
    child: RefCell<Option<Child>>,
    writer: RefCell<Option<JoinHandle<()>>>,
    reader: JoinHandle<()>,
}

impl ChildProcessChannel {
    /// Spawn `command` and start the stdio loops
    pub fn spawn(command: &str, args: &[String]) -> RpcResult<Self> {
        log::debug!("Spawning process: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Child process stdin not available")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Child process stdout not available")
        })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let listener: SharedListener = Rc::new(RefCell::new(None));

        let writer = tokio::task::spawn_local(async move {
            if let Err(e) = write_loop(stdin, outbound_rx).await {
                log::error!("Stdin write loop error: {}", e);
            }
        });

        let reader = {
            let listener = listener.clone();
            tokio::task::spawn_local(async move {
                if let Err(e) = read_loop(stdout, listener).await {
                    log::error!("Stdout read loop error: {}", e);
                }
            })
        };

        Ok(Self {
            outbound_tx: RefCell::new(Some(outbound_tx)),
            listener,
            child: RefCell::new(Some(child)),
            writer: RefCell::new(Some(writer)),
            reader,
        })
    }

    /// Close the child's stdin after pending writes, then wait for it to
    /// exit. Kills the child if it outlives the grace period.
    pub async fn shutdown(&self) -> RpcResult<()> {
        log::debug!("Shutting down child process channel");

        // 送信側を閉じるとwrite loopが終了しstdinがEOFになる
        self.outbound_tx.borrow_mut().take();
        let writer = self.writer.borrow_mut().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                log::error!("Task join error: {}", e);
            }
        }

        let child = self.child.borrow_mut().take();
        if let Some(mut child) = child {
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    log::debug!("Process exited with status: {:?}", status);
                }
                Err(_) => {
                    log::warn!("Process didn't exit gracefully, killing");
                    child.kill().await?;
                }
            }
        }

        Ok(())
    }
}

impl Channel for ChildProcessChannel {
    fn send(&self, payload: String) -> Result<(), ChannelError> {
        match self.outbound_tx.borrow().as_ref() {
            Some(tx) => tx.send(payload).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    fn on_message(&self, listener: MessageListener) {
        *self.listener.borrow_mut() = Some(Rc::from(listener));
    }
}

impl Drop for ChildProcessChannel {
    fn drop(&mut self) {
        log::debug!("ChildProcessChannel dropped, cleaning up tasks");
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
        self.reader.abort();
    }
}

async fn write_loop(
    mut stdin: ChildStdin,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) -> io::Result<()> {
    while let Some(payload) = outbound_rx.recv().await {
        log::debug!("Sending: {}", payload);
        write_frame(&mut stdin, &payload).await?;
    }
    log::debug!("Outbound channel closed");
    Ok(())
}

async fn read_loop<R: AsyncRead + Unpin>(input: R, listener: SharedListener) -> io::Result<()> {
    let mut reader = FrameReader::new(BufReader::new(input))?;

    while let Some(payload) = reader.read_frame().await? {
        log::debug!("Received: {}", payload);

        // リスナーを複製してから呼び出す（ハンドラー内での再登録に備える）
        let current = listener.borrow().clone();
        match current {
            Some(listener) => {
                if let Err(e) = listener(&payload) {
                    log::error!("Failed to process inbound message: {}", e);
                }
            }
            None => log::warn!("No listener subscribed, dropping inbound message"),
        }
    }

    log::debug!("EOF reached, terminating read loop");
    Ok(())
}
