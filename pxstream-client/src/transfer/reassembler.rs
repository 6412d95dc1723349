use crate::error::TransferError;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Upper bound on the buffer reserved up front from a declared length.
const MAX_PREALLOCATION: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    FreezeFrame,
    File,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::FreezeFrame => write!(f, "freeze-frame"),
            TransferKind::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransfer {
    pub kind: TransferKind,
    pub data: Bytes,
    /// Bytes received beyond the declared length and dropped.
    pub overrun: usize,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
}

impl CompletedTransfer {
    pub fn overrun_error(&self) -> Option<TransferError> {
        (self.overrun > 0).then(|| TransferError::Overrun {
            kind: self.kind,
            declared: self.data.len(),
            received: self.data.len() + self.overrun,
        })
    }
}

struct InProgress {
    declared: usize,
    buffer: BytesMut,
}

#[derive(Default)]
struct FileMeta {
    extension: Option<String>,
    mime_type: Option<String>,
}

/// Accumulates chunked payloads, one transfer per [`TransferKind`].
#[derive(Default)]
pub struct ChunkReassembler {
    transfers: HashMap<TransferKind, InProgress>,
    file_meta: FileMeta,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transfer of `declared` bytes. An unfinished transfer of the
    /// same kind is discarded and reported as `Superseded`; an empty
    /// declaration is refused and reported as `Empty`.
    pub fn begin(&mut self, kind: TransferKind, declared: usize) -> Option<TransferError> {
        if declared == 0 {
            warn!("Refusing empty {} transfer", kind);
            return Some(TransferError::Empty { kind });
        }

        let superseded = self.transfers.remove(&kind).map(|old| {
            let err = TransferError::Superseded {
                kind,
                declared: old.declared,
                received: old.buffer.len(),
            };
            warn!("{}", err);
            err
        });

        debug!("Begin {} transfer of {} bytes", kind, declared);
        self.transfers.insert(
            kind,
            InProgress {
                declared,
                buffer: BytesMut::with_capacity(declared.min(MAX_PREALLOCATION)),
            },
        );
        superseded
    }

    /// Append a chunk in arrival order. Returns the finished payload once the
    /// declared length is reached; bytes past it are dropped.
    pub fn append(
        &mut self,
        kind: TransferKind,
        chunk: &[u8],
    ) -> Result<Option<CompletedTransfer>, TransferError> {
        let Some(transfer) = self.transfers.get_mut(&kind) else {
            warn!("Ignoring {} byte {} chunk with no transfer in progress", chunk.len(), kind);
            return Err(TransferError::NoActiveTransfer { kind });
        };

        let room = transfer.declared - transfer.buffer.len();
        let (fits, overrun) = if chunk.len() > room {
            (&chunk[..room], chunk.len() - room)
        } else {
            (chunk, 0)
        };
        transfer.buffer.extend_from_slice(fits);

        if transfer.buffer.len() < transfer.declared {
            return Ok(None);
        }

        let Some(done) = self.transfers.remove(&kind) else {
            return Ok(None);
        };
        let (extension, mime_type) = match kind {
            TransferKind::File => (
                self.file_meta.extension.take(),
                self.file_meta.mime_type.take(),
            ),
            TransferKind::FreezeFrame => (None, None),
        };

        let completed = CompletedTransfer {
            kind,
            data: done.buffer.freeze(),
            overrun,
            extension,
            mime_type,
        };
        if let Some(err) = completed.overrun_error() {
            warn!("{}", err);
        }
        debug!("{} transfer complete ({} bytes)", kind, completed.data.len());
        Ok(Some(completed))
    }

    /// Declared length of the transfer in progress, if any.
    pub fn declared(&self, kind: TransferKind) -> Option<usize> {
        self.transfers.get(&kind).map(|t| t.declared)
    }

    pub fn received(&self, kind: TransferKind) -> usize {
        self.transfers.get(&kind).map_or(0, |t| t.buffer.len())
    }

    pub fn set_file_extension(&mut self, extension: String) {
        self.file_meta.extension = Some(extension);
    }

    pub fn set_file_mime_type(&mut self, mime_type: String) {
        self.file_meta.mime_type = Some(mime_type);
    }

    /// Drop the in-progress transfer of `kind`. Returns true if one existed.
    pub fn discard(&mut self, kind: TransferKind) -> bool {
        self.transfers.remove(&kind).is_some()
    }

    /// Drop every partial transfer and pending file metadata.
    pub fn clear(&mut self) {
        if !self.transfers.is_empty() {
            debug!("Discarding {} partial transfer(s)", self.transfers.len());
        }
        self.transfers.clear();
        self.file_meta = FileMeta::default();
    }
}
