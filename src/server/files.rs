//! Static files from a domain's document root, whole or as one byte range.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::http::mime;
use crate::http::request::ByteRange;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const INDEX: &str = "index.html";

/// Maps a normalised request path below `root`. Anything but plain segments is refused.
pub fn map_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for comp in Path::new(request_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => path.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// File content still to be sent, read in `chunk_size` pieces.
#[derive(Debug)]
pub struct FileBody {
    file: File,
    offset: u64,
    remaining: u64,
    chunk_size: usize,
}

impl FileBody {
    fn open(mut file: File, offset: u64, len: u64, chunk_size: usize) -> io::Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            file,
            offset,
            remaining: len,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Bytes left to send.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The file positioned at `offset`, the byte count left and the chunk size.
    pub fn into_parts(self) -> (File, u64, usize) {
        (self.file, self.remaining, self.chunk_size)
    }
}

impl Iterator for FileBody {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut chunk = vec![0u8; want];
        match self.file.read_exact(&mut chunk) {
            Ok(()) => {
                self.offset += want as u64;
                self.remaining -= want as u64;
                Some(Ok(chunk))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

/// Response head plus the file content to stream after it, if any.
#[derive(Debug)]
pub struct Served {
    pub head: Response,
    pub body: Option<FileBody>,
}

impl Served {
    fn status(head: Response) -> Self {
        Self { head, body: None }
    }
}

fn locate(root: &Path, request_path: &str) -> Result<(PathBuf, u64), Response> {
    let mut path = map_path(root, request_path).ok_or_else(Response::forbidden)?;
    let mut meta = fs::metadata(&path).map_err(|_| Response::not_found())?;
    if meta.is_dir() {
        path.push(INDEX);
        meta = fs::metadata(&path).map_err(|_| Response::not_found())?;
    }
    if !meta.is_file() {
        return Err(Response::not_found());
    }
    Ok((path, meta.len()))
}

/// Serves `request_path` from `root`, honouring a single `Range: bytes=` header.
pub fn serve(root: &Path, request_path: &str, range: Option<&[u8]>, chunk_size: usize) -> Served {
    let (path, total) = match locate(root, request_path) {
        Ok(found) => found,
        Err(response) => return Served::status(response),
    };
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Served::status(Response::not_found()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to open file");
            return Served::status(Response::internal_error());
        }
    };
    let content_type = mime::for_path(&path);

    let (builder, first, len) = match range.and_then(ByteRange::parse) {
        None => {
            let builder = ResponseBuilder::new(StatusCode::Ok);
            (builder, 0, total)
        }
        Some(requested) => match requested.resolve(total) {
            Err(_) => return Served::status(Response::range_not_satisfiable(total)),
            Ok((first, last)) => {
                let builder = ResponseBuilder::new(StatusCode::PartialContent)
                    .header("Content-Range", format!("bytes {first}-{last}/{total}"));
                (builder, first, last - first + 1)
            }
        },
    };

    let body = match FileBody::open(file, first, len, chunk_size) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to seek file");
            return Served::status(Response::internal_error());
        }
    };
    let head = builder
        .header("Content-Type", content_type)
        .header("Content-Length", len.to_string())
        .header("Accept-Ranges", "bytes")
        .build();
    Served { head, body: Some(body) }
}
