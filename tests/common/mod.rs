#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct ResponseSpec {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
}

impl ResponseSpec {
    pub fn new(
        status: u16,
        headers: Vec<(impl Into<String>, impl Into<String>)>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, Vec::<(String, String)>::new(), Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_content_length(raw_headers: &[u8]) -> usize {
    let text = String::from_utf8_lossy(raw_headers);
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(parsed) = value.trim().parse::<usize>() {
                    return parsed;
                }
            }
        }
    }
    0
}

fn read_http_message(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;

    let mut raw = Vec::new();
    loop {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);

        if let Some(header_end) = find_header_end(&raw) {
            let content_length = parse_content_length(&raw[..header_end]);
            let expected_total = header_end + 4 + content_length;
            if raw.len() >= expected_total {
                break;
            }
        }
    }

    Ok(raw)
}

fn write_http_response(stream: &mut TcpStream, response: &ResponseSpec) -> std::io::Result<()> {
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        response.body.len()
    )
    .into_bytes();

    for (name, value) in &response.headers {
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(&response.body);

    stream.write_all(&raw)?;
    stream.flush()
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn request_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .split("\r\n")
        .next()
        .unwrap_or_default()
        .to_owned()
}

/// One scripted mock endpoint: pops responses per request, repeating the last
/// spec once the script is exhausted, and records every request line.
pub struct MockEndpoint {
    base_url: String,
    served: Arc<AtomicUsize>,
    request_lines: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MockEndpoint {
    pub fn start(script: Vec<ResponseSpec>) -> Self {
        assert!(!script.is_empty(), "mock endpoint needs at least one spec");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock endpoint");
        let base_url = format!(
            "http://{}",
            listener.local_addr().expect("read local address")
        );
        listener
            .set_nonblocking(true)
            .expect("set listener nonblocking");

        let served = Arc::new(AtomicUsize::new(0));
        let request_lines = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let served_clone = Arc::clone(&served);
        let request_lines_clone = Arc::clone(&request_lines);
        let stop_clone = Arc::clone(&stop);
        let mut remaining = script;

        let join = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(30);
            while Instant::now() < deadline && !stop_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let response = if remaining.len() > 1 {
                            remaining.remove(0)
                        } else {
                            remaining[0].clone()
                        };
                        let Ok(raw) = read_http_message(&mut stream) else {
                            continue;
                        };
                        lock_unpoisoned(&request_lines_clone).push(request_line(&raw));
                        if !response.delay.is_zero() {
                            thread::sleep(response.delay);
                        }
                        let _ = write_http_response(&mut stream, &response);
                        served_clone.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(2));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url,
            served,
            request_lines,
            stop,
            join: Some(join),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn served_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    pub fn request_lines(&self) -> Vec<String> {
        lock_unpoisoned(&self.request_lines).clone()
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
