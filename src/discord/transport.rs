use std::io;
use std::path::PathBuf;

const SLOT_COUNT: u8 = 10;

#[cfg(unix)]
pub type IpcStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Candidate socket paths in the order the Discord client allocates them.
#[cfg(unix)]
pub fn candidate_paths() -> Vec<PathBuf> {
    let base = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|name| std::env::var_os(name))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    socket_paths_in(&base)
}

#[cfg(windows)]
pub fn candidate_paths() -> Vec<PathBuf> {
    (0..SLOT_COUNT)
        .map(|slot| PathBuf::from(format!(r"\\?\pipe\discord-ipc-{slot}")))
        .collect()
}

#[cfg_attr(windows, allow(dead_code))]
fn socket_paths_in(base: &std::path::Path) -> Vec<PathBuf> {
    (0..SLOT_COUNT)
        .map(|slot| base.join(format!("discord-ipc-{slot}")))
        .collect()
}

/// Opens the first reachable Discord socket.
pub async fn connect() -> io::Result<IpcStream> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no discord ipc socket found");
    for path in candidate_paths() {
        match open(&path).await {
            Ok(stream) => {
                tracing::debug!(path = %path.display(), "connected to discord ipc");
                return Ok(stream);
            }
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

#[cfg(unix)]
async fn open(path: &std::path::Path) -> io::Result<IpcStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn open(path: &std::path::Path) -> io::Result<IpcStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}
