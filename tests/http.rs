use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path as ObjectPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use gfs_fetch::{
    store::{self, Remote, RemoteProbe, StoreOptions},
    FileAcquirer, Layout, Resolution, RetryPolicy, RunSpecification,
};

#[derive(Debug, Clone, Copy)]
enum Serve {
    /// Answers every request with this status and no body.
    Status(u16),
    /// Serves a body of `len` bytes, one byte every `every`.
    Trickle { len: usize, every: Duration },
}

/// Starts a server on a free port, returning the remote root to use and a
/// count of the connections it accepted.
async fn serve(mode: Serve) -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move { respond(&mut socket, mode).await });
        }
    });

    let root = Url::parse(&format!("http://{}/gfs/prod/", addr)).unwrap();
    (root, hits)
}

async fn respond(socket: &mut TcpStream, mode: Serve) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let head = request.starts_with(b"HEAD");

    match mode {
        Serve::Status(code) => {
            let response = format!(
                "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Serve::Trickle { len, every } => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nLast-Modified: Mon, 20 Jun 2016 06:00:00 GMT\r\nETag: \"f000\"\r\nConnection: close\r\n\r\n",
                len
            );
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            if !head {
                for _ in 0..len {
                    tokio::time::sleep(every).await;
                    if socket.write_all(b"G").await.is_err() || socket.flush().await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    let _ = socket.shutdown().await;
}

fn location() -> ObjectPath {
    ObjectPath::from("gfs.2016062000/gfs.t00z.pgrb2.0p25.f000")
}

#[tokio::test]
async fn gone_status_is_absence() {
    let (root, _) = serve(Serve::Status(410)).await;
    let remote = store::new(&root, &StoreOptions::default()).unwrap();

    assert_eq!(remote.probe(&location()).await.unwrap(), RemoteProbe::Missing);
}

#[tokio::test]
async fn forbidden_status_is_absence() {
    let (root, _) = serve(Serve::Status(403)).await;
    let remote = store::new(&root, &StoreOptions::default()).unwrap();

    assert_eq!(remote.probe(&location()).await.unwrap(), RemoteProbe::Missing);
}

#[tokio::test]
async fn local_copy_against_gone_remote_is_retired() {
    let (root, _) = serve(Serve::Status(410)).await;
    let output = tempfile::tempdir().unwrap();
    let layout = Layout::new(root.as_str(), output.path()).unwrap();
    let spec = RunSpecification::new(2016, 6, 20, 0, 0, 0, 3).unwrap();
    let task = layout.tasks(&spec).unwrap().remove(0);

    std::fs::create_dir_all(layout.local_dir(&spec)).unwrap();
    std::fs::write(task.local_path(), b"kept from an old run").unwrap();

    let remote = store::new(layout.remote_root(), &StoreOptions::default()).unwrap();
    let acquirer = FileAcquirer::new(Arc::new(remote), RetryPolicy::default());

    let resolution = tokio::time::timeout(Duration::from_secs(10), acquirer.acquire(&task))
        .await
        .expect("a gone remote resolves at once");
    assert_eq!(resolution, Resolution::Retired);
}

#[tokio::test]
async fn gone_remote_without_local_copy_waits_absent_interval() {
    let (root, hits) = serve(Serve::Status(410)).await;
    let output = tempfile::tempdir().unwrap();
    let layout = Layout::new(root.as_str(), output.path()).unwrap();
    let spec = RunSpecification::new(2016, 6, 20, 0, 0, 0, 3).unwrap();
    let task = layout.tasks(&spec).unwrap().remove(0);

    let remote = store::new(layout.remote_root(), &StoreOptions::default()).unwrap();
    // a fault would be retried after 50ms, absence only after an hour
    let policy = RetryPolicy {
        absent_interval: Duration::from_secs(3_600),
        fault_interval: Duration::from_millis(50),
        jitter: Duration::ZERO,
    };
    let acquirer = FileAcquirer::new(Arc::new(remote), policy);

    let outcome = tokio::time::timeout(Duration::from_secs(2), acquirer.acquire(&task)).await;
    assert!(outcome.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!task.local_path().exists());
}

#[tokio::test]
async fn head_reports_content_length() {
    let (root, _) = serve(Serve::Trickle {
        len: 3,
        every: Duration::ZERO,
    })
    .await;
    let remote = store::new(&root, &StoreOptions::default()).unwrap();

    assert_eq!(
        remote.probe(&location()).await.unwrap(),
        RemoteProbe::Available { content_length: 3 }
    );
}

/// Takes about 36 seconds: the body outlasts the http client's old 30
/// second default request timeout.
#[tokio::test]
async fn slow_download_is_not_cut_off() {
    let (root, _) = serve(Serve::Trickle {
        len: 4,
        every: Duration::from_secs(9),
    })
    .await;
    let remote = store::new(&root, &StoreOptions::default()).unwrap();
    let output = tempfile::tempdir().unwrap();
    let local = output.path().join("gfs.t00z.pgrb2.0p25.f000");

    let written = tokio::time::timeout(
        Duration::from_secs(90),
        remote.download(&location(), &local),
    )
    .await
    .expect("download finishes")
    .unwrap();

    assert_eq!(written, 4);
    assert_eq!(std::fs::read(&local).unwrap(), b"GGGG");
}

#[tokio::test]
async fn explicit_request_timeout_still_applies() {
    let (root, _) = serve(Serve::Trickle {
        len: 4,
        every: Duration::from_secs(2),
    })
    .await;
    let options = StoreOptions {
        request_timeout: Some(Duration::from_secs(1)),
    };
    let remote = store::new(&root, &options).unwrap();
    let output = tempfile::tempdir().unwrap();

    let result = remote
        .download(&location(), &output.path().join("gfs.t00z.pgrb2.0p25.f000"))
        .await;

    let err = result.unwrap_err();
    assert!(err.is_transient(), "{err}");
}
