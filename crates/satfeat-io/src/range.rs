//! `Read + Seek` over an HTTP resource using `Range` requests.
//!
//! One block of bytes is held at a time. A read outside the block fetches a
//! new one starting at the read position, so a TIFF decoder pulls the header,
//! the IFD and the chunks it actually decodes, nothing else. Servers that
//! ignore `Range` and answer `200` hand over the whole body as one block.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

/// Default bytes per range request.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024;

pub struct HttpRangeReader {
    agent: ureq::Agent,
    url: String,
    block_size: u64,
    len: u64,
    pos: u64,
    block_start: u64,
    block: Vec<u8>,
    requests: usize,
}

impl HttpRangeReader {
    /// Fetch the first block and learn the resource length.
    pub fn open(agent: ureq::Agent, url: impl Into<String>, block_size: u64) -> io::Result<Self> {
        let mut reader = Self {
            agent,
            url: url.into(),
            block_size: block_size.max(1),
            len: 0,
            pos: 0,
            block_start: 0,
            block: Vec::new(),
            requests: 0,
        };
        reader.len = reader.fetch(0, reader.block_size)?;
        Ok(reader)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Range requests issued so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Replace the block with `size` bytes from `start`; returns the total length.
    fn fetch(&mut self, start: u64, size: u64) -> io::Result<u64> {
        let end = start + size.max(1) - 1;
        self.requests += 1;
        trace!(start, end, "range request to {}", self.url);
        let response = self
            .agent
            .get(&self.url)
            .set("Range", &format!("bytes={start}-{end}"))
            .call()
            .map_err(|err| io::Error::other(format!("GET {} bytes {start}-{end}: {err}", self.url)))?;

        match response.status() {
            206 => {
                let total = response
                    .header("Content-Range")
                    .and_then(content_range_total)
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("{} answered 206 without a usable Content-Range", self.url),
                        )
                    })?;
                let mut block = Vec::with_capacity(size as usize);
                response.into_reader().take(size).read_to_end(&mut block)?;
                self.block_start = start;
                self.block = block;
                Ok(total)
            }
            200 => {
                let mut block = Vec::new();
                response.into_reader().read_to_end(&mut block)?;
                self.block_start = 0;
                self.block = block;
                Ok(self.block.len() as u64)
            }
            status => Err(io::Error::other(format!(
                "GET {} bytes {start}-{end} returned HTTP {status}",
                self.url
            ))),
        }
    }

    fn block_end(&self) -> u64 {
        self.block_start + self.block.len() as u64
    }
}

impl Read for HttpRangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        if self.pos < self.block_start || self.pos >= self.block_end() {
            let want = (buf.len() as u64).max(self.block_size).min(self.len - self.pos);
            self.fetch(self.pos, want)?;
            if self.pos < self.block_start || self.pos >= self.block_end() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} returned no bytes at offset {}", self.url, self.pos),
                ));
            }
        }
        let offset = (self.pos - self.block_start) as usize;
        let n = buf.len().min(self.block.len() - offset);
        buf[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        self.pos = target;
        Ok(target)
    }
}

/// Total length from `bytes <first>-<last>/<total>`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture_server::{serve_ranges, FixtureServer, Response};

    fn body() -> Vec<u8> {
        (0..=255u8).cycle().take(1000).collect()
    }

    #[test]
    fn content_range_total_parses_length() {
        assert_eq!(content_range_total("bytes 0-99/1000"), Some(1000));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn reads_and_seeks_fetch_only_touched_blocks() {
        let data = body();
        let served = data.clone();
        let server = FixtureServer::start(move |request| serve_ranges(&served, request));

        let mut reader =
            HttpRangeReader::open(ureq::agent(), server.url("/blob.bin"), 100).unwrap();
        assert_eq!(reader.len(), 1000);
        assert_eq!(reader.requests(), 1);

        let mut head = [0u8; 10];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(head[..], data[..10]);
        assert_eq!(reader.requests(), 1);

        reader.seek(SeekFrom::End(-20)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail[..], data[980..]);
        assert_eq!(reader.requests(), 2);

        reader.seek(SeekFrom::Start(450)).unwrap();
        let mut middle = [0u8; 150];
        reader.read_exact(&mut middle).unwrap();
        assert_eq!(middle[..], data[450..600]);
        assert_eq!(reader.requests(), 3);
        assert!(server.bytes_served() < data.len() / 2);
    }

    #[test]
    fn servers_without_range_support_serve_the_whole_body() {
        let data = body();
        let served = data.clone();
        let server = FixtureServer::start(move |_| Response::ok(served.clone()));

        let mut reader =
            HttpRangeReader::open(ureq::agent(), server.url("/blob.bin"), 64).unwrap();
        reader.seek(SeekFrom::Start(900)).unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest[..], data[900..]);
        assert_eq!(reader.requests(), 1);
    }

    #[test]
    fn missing_resource_fails_to_open() {
        let server = FixtureServer::start(|_| {
            Response::status(404, b"not found".to_vec())
        });
        let err = HttpRangeReader::open(ureq::agent(), server.url("/gone.tif"), 64)
            .err()
            .unwrap();
        assert!(err.to_string().contains("404"), "{err}");
    }
}
