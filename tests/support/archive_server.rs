use std::{
    io::{Cursor, Read, Write},
    net::TcpListener,
    thread,
};

use zip::write::SimpleFileOptions;

/// Build an in-memory zip holding `entries`, stored uncompressed.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip(entries, zip::CompressionMethod::Stored)
}

/// Build an in-memory zip holding `entries`, deflated.
pub fn deflated_zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip(entries, zip::CompressionMethod::Deflated)
}

fn build_zip(entries: &[(&str, &[u8])], method: zip::CompressionMethod) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(data).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Serve `body` with a Content-Length once and return its URL.
pub fn serve_body(body: Vec<u8>) -> String {
    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
    serve_once(head, body)
}

/// Serve a bare status line with an empty body.
pub fn serve_status(status: &str) -> String {
    serve_once(
        format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n"),
        Vec::new(),
    )
}

fn serve_once(head: String, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let addr = listener.local_addr().expect("server addr");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{addr}/archive.zip")
}
