//! Typed filesystem calls over a [`Transport`].

use crate::protocol::{Reply, Request};
use crate::transport::{Transport, TransportError};
use crate::vfs::Stat;

type Result<T> = std::result::Result<T, TransportError>;

#[derive(Clone)]
pub struct FsClient {
    transport: Transport,
}

fn unexpected(request: &'static str, reply: &Reply) -> TransportError {
    let got = match reply {
        Reply::Unit => "unit",
        Reply::Hello { .. } => "hello",
        Reply::Names { .. } => "names",
        Reply::Bytes { .. } => "bytes",
        Reply::Stat { .. } => "stat",
    };
    TransportError::UnexpectedReply { request, got }
}

impl FsClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    async fn unit(&self, request: Request) -> Result<()> {
        let tag = request.tag();
        match self.transport.call(request).await? {
            Reply::Unit => Ok(()),
            other => Err(unexpected(tag, &other)),
        }
    }

    /// Worker version string.
    pub async fn hello(&self) -> Result<String> {
        match self.transport.call(Request::Hello).await? {
            Reply::Hello { version } => Ok(version),
            other => Err(unexpected("hello", &other)),
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.unit(Request::FsMkdir { path: path.into() }).await
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        match self.transport.call(Request::FsReaddir { path: path.into() }).await? {
            Reply::Names { names } => Ok(names),
            other => Err(unexpected("fs_readdir", &other)),
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match self.transport.call(Request::FsReadFile { path: path.into() }).await? {
            Reply::Bytes { data } => Ok(data),
            other => Err(unexpected("fs_read_file", &other)),
        }
    }

    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.unit(Request::FsWriteFile {
            path: path.into(),
            data: data.to_vec(),
        })
        .await
    }

    pub async fn stat(&self, path: &str) -> Result<Stat> {
        match self.transport.call(Request::FsStat { path: path.into() }).await? {
            Reply::Stat { stat } => Ok(stat),
            other => Err(unexpected("fs_stat", &other)),
        }
    }

    pub async fn rm(&self, path: &str) -> Result<()> {
        self.unit(Request::FsRm { path: path.into() }).await
    }

    pub async fn rmdir(&self, path: &str) -> Result<()> {
        self.unit(Request::FsRmdir { path: path.into() }).await
    }

    pub async fn mv(&self, from: &str, to: &str) -> Result<()> {
        self.unit(Request::FsMv {
            from: from.into(),
            to: to.into(),
        })
        .await
    }

    pub async fn cp(&self, from: &str, to: &str) -> Result<()> {
        self.unit(Request::FsCp {
            from: from.into(),
            to: to.into(),
        })
        .await
    }
}
