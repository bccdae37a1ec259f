use std::{
    fs::File,
    io::{self, Read, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::http_client;

use super::InstallError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stream the body at `url` into `file`, returning the byte count.
///
/// `cancel` is checked before the request and before every chunk.
pub(super) fn stream_to_file<F>(
    url: &str,
    file: &mut File,
    on_progress: &mut F,
    cancel: &AtomicBool,
) -> Result<u64, InstallError>
where
    F: FnMut(u8),
{
    ensure_not_cancelled(cancel)?;
    let response = http_client::get(url)?;
    let total = http_client::content_length(&response);
    let mut reader = response.into_reader();
    let mut progress = ProgressTracker::new(total);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    loop {
        ensure_not_cancelled(cancel)?;
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(InstallError::Download(format!(
                    "Reading {url} failed after {received} bytes: {err}"
                )));
            }
        };
        file.write_all(&buf[..read])?;
        received += read as u64;
        if let Some(percent) = progress.advance(received) {
            on_progress(percent);
        }
    }
    file.flush()?;

    if let Some(total) = total {
        if received < total {
            return Err(InstallError::Download(format!(
                "{url} ended after {received} of {total} bytes"
            )));
        }
    }
    Ok(received)
}

fn ensure_not_cancelled(cancel: &AtomicBool) -> Result<(), InstallError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(InstallError::Cancelled);
    }
    Ok(())
}

/// Turns byte counts into whole percentages, reporting each value once.
pub(super) struct ProgressTracker {
    total: Option<u64>,
    last: Option<u8>,
}

impl ProgressTracker {
    pub(super) fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|total| *total > 0),
            last: None,
        }
    }

    pub(super) fn advance(&mut self, received: u64) -> Option<u8> {
        let total = self.total?;
        let percent = percent_of(received, total);
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

/// `floor(received * 100 / total)` clamped to 100.
fn percent_of(received: u64, total: u64) -> u8 {
    let percent = u128::from(received) * 100 / u128::from(total);
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        format!("http://{addr}/model.zip")
    }

    fn sized(body: Vec<u8>) -> String {
        serve_once(
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()),
            body,
        )
    }

    #[test]
    fn percent_floors_and_clamps() {
        assert_eq!(percent_of(0, 3), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 66);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(10, 3), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn tracker_reports_each_value_once() {
        let mut tracker = ProgressTracker::new(Some(1000));
        assert_eq!(tracker.advance(1), Some(0));
        assert_eq!(tracker.advance(5), None);
        assert_eq!(tracker.advance(10), Some(1));
        assert_eq!(tracker.advance(1000), Some(100));
        assert_eq!(tracker.advance(1000), None);
    }

    #[test]
    fn tracker_is_silent_without_length() {
        let mut tracker = ProgressTracker::new(None);
        assert_eq!(tracker.advance(42), None);
        let mut zero = ProgressTracker::new(Some(0));
        assert_eq!(zero.advance(42), None);
    }

    #[test]
    fn streams_body_and_reports_progress() {
        let body = vec![7u8; 300 * 1024];
        let url = sized(body.clone());
        let mut file = tempfile::tempfile().unwrap();
        let mut seen = Vec::new();
        let cancel = AtomicBool::new(false);

        let written =
            stream_to_file(&url, &mut file, &mut |p| seen.push(p), &cancel).unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(file.metadata().unwrap().len(), body.len() as u64);
    }

    #[test]
    fn no_progress_without_content_length() {
        let body = b"unsized body".to_vec();
        let url = serve_once("HTTP/1.0 200 OK\r\n\r\n".to_string(), body.clone());
        let mut file = tempfile::tempfile().unwrap();
        let mut calls = 0usize;
        let cancel = AtomicBool::new(false);

        let written = stream_to_file(&url, &mut file, &mut |_| calls += 1, &cancel).unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(calls, 0);
    }

    #[test]
    fn cancel_mid_stream_stops_reading() {
        let url = sized(vec![1u8; 512 * 1024]);
        let mut file = tempfile::tempfile().unwrap();
        let cancel = AtomicBool::new(false);

        let err = stream_to_file(
            &url,
            &mut file,
            &mut |_| cancel.store(true, Ordering::SeqCst),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, InstallError::Cancelled));
        assert!(file.metadata().unwrap().len() < 512 * 1024);
    }

    #[test]
    fn error_status_is_a_download_error() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string(),
            Vec::new(),
        );
        let mut file = tempfile::tempfile().unwrap();
        let cancel = AtomicBool::new(false);
        let err = stream_to_file(&url, &mut file, &mut |_| {}, &cancel).unwrap_err();
        assert!(matches!(err, InstallError::Download(_)));
    }
}
