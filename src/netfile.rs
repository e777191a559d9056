/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::io;
use std::io::{Read, Seek, SeekFrom};
use std::fs::File;
use std::path::Path;

use reqwest::blocking::{Client, ClientBuilder};

/* -------------------------------------------------------------------------- */

/// Default size of the range-request window for remote files. Tree
/// traversals perform many small reads; without a window each of them
/// would cost one HTTP request.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Applied to the HTTP client builder exactly once, before the first
/// request, so that users can install credentials, proxies, or timeouts.
/// An error aborts the open.
pub type TransportCallback<'a> = &'a dyn Fn(ClientBuilder) -> reqwest::Result<ClientBuilder>;

/* -------------------------------------------------------------------------- */

// Wrapper for a file or HTTP stream that supports Read + Seek
#[derive(Debug)]
enum NetFileStream {
    File(File),
    Http(HttpRangeReader),
    Closed,
}

#[derive(Debug)]
pub struct NetFile {
    stream: NetFileStream,
}

impl NetFile {

    fn new(stream: NetFileStream) -> Self {
        NetFile { stream }
    }

    fn open_file(filename: &str) -> io::Result<NetFile> {
        let path = Path::new(filename);

        if path.exists() && path.is_file() {
            let file = File::open(path)?;
            Ok(NetFile::new(NetFileStream::File(file)))
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("file `{}` not found", filename)))
        }
    }

    fn open_http(url: &str, buf_size: usize, callback: Option<TransportCallback>) -> io::Result<NetFile> {
        let mut builder = Client::builder();

        if let Some(callback) = callback {
            builder = callback(builder).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }

        let client = builder.build().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let head_resp = client.head(url).send().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if !head_resp.status().is_success() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "HTTP request failed"));
        }

        let content_length = head_resp
            .content_length()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header"))?;

        let http_reader = HttpRangeReader::new(client, url.to_string(), content_length, buf_size);

        Ok(NetFile::new(NetFileStream::Http(http_reader)))
    }

    pub fn open(filename: &str) -> io::Result<NetFile> {
        NetFile::open_with(filename, DEFAULT_BUFFER_SIZE, None)
    }

    pub fn open_with(filename: &str, buf_size: usize, callback: Option<TransportCallback>) -> io::Result<NetFile> {
        if filename.starts_with("http://") || filename.starts_with("https://") {
            NetFile::open_http(filename, buf_size, callback)
        } else if filename.starts_with("ftp://") {
            Err(io::Error::new(io::ErrorKind::Unsupported, "ftp transport is not supported"))
        } else {
            NetFile::open_file(filename)
        }
    }

    /// Releases the underlying stream. Subsequent reads and seeks fail.
    pub fn close(&mut self) {
        self.stream = NetFileStream::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.stream, NetFileStream::Closed)
    }

}

impl Read for NetFile {

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            NetFileStream::File(file) => file.read(buf),
            NetFileStream::Http(file) => file.read(buf),
            NetFileStream::Closed     => Err(io::Error::new(io::ErrorKind::NotConnected, "file handle is closed")),
        }
    }

}

impl Seek for NetFile {

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.stream {
            NetFileStream::File(file) => file.seek(pos),
            NetFileStream::Http(file) => file.seek(pos),
            NetFileStream::Closed     => Err(io::Error::new(io::ErrorKind::NotConnected, "file handle is closed")),
        }
    }

}

/* -------------------------------------------------------------------------- */

// HTTP reader that serves Read + Seek through a single buffered window
// obtained with range requests. The window starts at absolute offset
// `file_pos` and holds `buf` bytes; `buf_pos` is the read cursor within
// it. A seek inside the window only moves the cursor. A seek outside
// drops the window and defers the fetch until the next read.
#[derive(Debug)]
struct HttpRangeReader {
    client        : Client,
    url           : String,
    content_length: u64,
    buf           : Vec<u8>,
    file_pos      : u64,
    buf_pos       : usize,
    buf_size      : usize,
}

impl HttpRangeReader {

    fn new(client: Client, url: String, content_length: u64, buf_size: usize) -> Self {
        HttpRangeReader {
            client,
            url,
            content_length,
            buf     : Vec::new(),
            file_pos: 0,
            buf_pos : 0,
            buf_size: buf_size.max(1),
        }
    }

    fn position(&self) -> u64 {
        self.file_pos + self.buf_pos as u64
    }

    // Refill the window at the given absolute offset
    fn fetch(&mut self, pos: u64) -> io::Result<()> {
        let end = (pos + self.buf_size as u64).min(self.content_length);

        if pos >= end {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "range request past end of file"));
        }

        let range_header = format!("bytes={}-{}", pos, end - 1);
        let response = self.client
            .get(&self.url)
            .header("Range", range_header)
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if !response.status().is_success() {
            return Err(io::Error::new(io::ErrorKind::Other, "HTTP range request failed"));
        }

        let bytes = response.bytes().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        self.buf      = bytes.to_vec();
        self.file_pos = pos;
        self.buf_pos  = 0;

        Ok(())
    }

}

impl Read for HttpRangeReader {

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;

        while n < buf.len() {
            if self.buf_pos >= self.buf.len() {
                let pos = self.position();
                if pos >= self.content_length {
                    break;
                }
                self.fetch(pos)?;
                if self.buf.is_empty() {
                    break;
                }
            }
            let available = self.buf.len() - self.buf_pos;
            let take      = available.min(buf.len() - n);

            buf[n..n + take].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + take]);

            self.buf_pos += take;
            n            += take;
        }
        Ok(n)
    }

}

impl Seek for HttpRangeReader {

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(p) => {
                if p >= 0 {
                    self.position() + p as u64
                } else {
                    self.position().checked_sub((-p) as u64)
                        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file"))?
                }
            }
            SeekFrom::End(p) => {
                if p >= 0 {
                    self.content_length + p as u64
                } else {
                    self.content_length.checked_sub((-p) as u64)
                        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file"))?
                }
            }
        };

        if new_pos > self.content_length {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek position beyond file size"));
        }

        if new_pos >= self.file_pos && new_pos < self.file_pos + self.buf.len() as u64 {
            // Window still covers the target, just move the cursor
            self.buf_pos = (new_pos - self.file_pos) as usize;
        } else {
            self.buf.clear();
            self.file_pos = new_pos;
            self.buf_pos  = 0;
        }

        Ok(new_pos)
    }

}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
