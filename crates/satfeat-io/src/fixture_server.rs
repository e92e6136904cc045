//! Loopback HTTP/1.1 server for network tests. One thread per connection,
//! every response closes its connection.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Send the first half of the body, wait, then the rest.
    pub pause: Option<Duration>,
}

impl Response {
    pub fn ok(body: Vec<u8>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
            pause: None,
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        let mut response = Self::ok(value.to_string().into_bytes());
        response
            .headers
            .push(("Content-Type".into(), "application/json".into()));
        response
    }

    pub fn paused(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }
}

/// `206` for a `Range: bytes=a-b` request, `200` with the whole body otherwise.
pub fn serve_ranges(body: &[u8], request: &Request) -> Response {
    let Some((first, last)) = request
        .header("Range")
        .and_then(|range| range.strip_prefix("bytes="))
        .and_then(|range| range.split_once('-'))
    else {
        return Response::ok(body.to_vec());
    };
    let len = body.len();
    let first: usize = first.parse().unwrap_or(0);
    let last: usize = last.parse().map_or(len.saturating_sub(1), |l: usize| l.min(len.saturating_sub(1)));
    if first >= len || first > last {
        let mut response = Response::status(416, Vec::new());
        response
            .headers
            .push(("Content-Range".into(), format!("bytes */{len}")));
        return response;
    }
    let mut response = Response::status(206, body[first..=last].to_vec());
    response
        .headers
        .push(("Content-Range".into(), format!("bytes {first}-{last}/{len}")));
    response
}

type Handler = dyn Fn(&Request) -> Response + Send + Sync;

pub struct FixtureServer {
    base: String,
    requests: Arc<Mutex<Vec<Request>>>,
    served: Arc<AtomicUsize>,
}

impl FixtureServer {
    pub fn start(handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let served = Arc::new(AtomicUsize::new(0));

        let (log, counter) = (Arc::clone(&requests), Arc::clone(&served));
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let (handler, log, counter) =
                    (Arc::clone(&handler), Arc::clone(&log), Arc::clone(&counter));
                thread::spawn(move || {
                    let _ = handle(stream, &*handler, &log, &counter);
                });
            }
        });
        Self {
            base,
            requests,
            served,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path (query included) equals `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// Response body bytes written so far.
    pub fn bytes_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

fn handle(
    stream: TcpStream,
    handler: &Handler,
    log: &Mutex<Vec<Request>>,
    served: &AtomicUsize,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((key, value)) = header.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;

    let request = Request {
        method,
        path,
        headers,
        body,
    };
    let response = handler(&request);
    log.lock().unwrap().push(request);
    served.fetch_add(response.body.len(), Ordering::SeqCst);

    let mut stream = stream;
    write!(stream, "HTTP/1.1 {} {}\r\n", response.status, reason(response.status))?;
    for (key, value) in &response.headers {
        write!(stream, "{key}: {value}\r\n")?;
    }
    write!(
        stream,
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    )?;
    match response.pause {
        Some(pause) => {
            let half = response.body.len() / 2;
            stream.write_all(&response.body[..half])?;
            stream.flush()?;
            thread::sleep(pause);
            stream.write_all(&response.body[half..])?;
        }
        None => stream.write_all(&response.body)?,
    }
    stream.flush()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
