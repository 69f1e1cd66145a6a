//! Uploading pipeline code and pre-built register blocks to GPU memory
//!
//! GPU memory management is not part of this crate. Compilation talks to an [`Uploader`]
//! which hands out one [`UploadTransaction`] per pipeline: the transaction receives the code
//! blob and, when the LOAD path is used, the context and SH register `(offset, value)` pairs
//! that `LOAD_*_REG_INDEX` packets read back. [`HostUploader`] is an in-memory implementation
//! used by tools and tests.

use crate::create_info::GpuHeap;
use crate::regs::{CONTEXT_SPACE_START, PERSISTENT_SPACE_START};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Alignment of the code blob and each register block within an allocation
const BLOCK_ALIGNMENT: u64 = 256;
/// Granularity at which the host uploader hands out GPU virtual addresses
const HOST_VA_GRANULARITY: u64 = 64 * 1024;
/// First GPU virtual address handed out by the host uploader
const HOST_VA_BASE: u64 = 0x1_0000_0000;

/// Errors raised while uploading a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("out of GPU memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: u64, available: u64 },
    #[error("{kind} register block overflow: {written} registers written, room for {capacity}")]
    RegisterBlockOverflow { kind: RegisterBlockKind, capacity: u32, written: u32 },
}

/// Which pre-uploaded register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterBlockKind {
    Context,
    Sh,
}

impl fmt::Display for RegisterBlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterBlockKind::Context => write!(f, "context"),
            RegisterBlockKind::Sh => write!(f, "SH"),
        }
    }
}

/// Sizes of the GPU memory needed by one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRequest {
    /// Context registers to reserve room for; zero disables the LOAD path
    pub ctx_reg_count: u32,
    /// SH registers to reserve room for; zero disables the LOAD path
    pub sh_reg_count: u32,
    pub heap: GpuHeap,
}

/// GPU memory owned by a pipeline; dropping it releases the memory
pub trait GpuAllocation: fmt::Debug + Send + Sync {
    fn gpu_va(&self) -> u64;
    fn size(&self) -> u64;
    fn heap(&self) -> GpuHeap;

    /// Offset of the pipeline's data within the underlying memory object
    fn offset(&self) -> u64 {
        0
    }
}

/// Source of upload transactions
pub trait Uploader {
    type Transaction<'a>: UploadTransaction
    where
        Self: 'a;

    /// Starts uploading a pipeline
    ///
    /// # Arguments
    /// * `code` - Machine code of every stage
    /// * `request` - Register block sizes and heap
    ///
    /// # Returns
    /// A transaction that stays open until [`UploadTransaction::end`]
    fn begin_upload(&mut self, code: &[u8], request: &UploadRequest) -> Result<Self::Transaction<'_>, UploadError>;
}

/// One pipeline's in-progress upload
pub trait UploadTransaction {
    /// GPU address of the first byte of code
    fn code_gpu_va(&self) -> u64;
    fn code_size(&self) -> u64;

    /// Whether register blocks are being built for the LOAD path
    fn enable_load_index_path(&self) -> bool;

    fn add_ctx_reg(&mut self, addr: u16, value: u32);
    fn add_sh_reg(&mut self, addr: u16, value: u32);

    fn ctx_reg_gpu_va(&self) -> u64;
    fn sh_reg_gpu_va(&self) -> u64;
    /// Number of context registers added so far
    fn ctx_reg_count(&self) -> u32;
    /// Number of SH registers added so far
    fn sh_reg_count(&self) -> u32;

    /// Finishes the upload and transfers ownership of the memory to the caller
    fn end(self) -> Result<Box<dyn GpuAllocation>, UploadError>
    where
        Self: Sized;
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Bytes of one register block entry: an `(offset, value)` dword pair
const REG_PAIR_BYTES: u64 = 8;

/// A completed host-side upload
#[derive(Debug, Clone)]
pub struct HostAllocation {
    gpu_va: u64,
    heap: GpuHeap,
    bytes: Bytes,
}

impl HostAllocation {
    /// Contents of the allocation as the GPU would see them
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Reads a little-endian dword at a GPU virtual address inside the allocation
    pub fn read_dword(&self, gpu_va: u64) -> Option<u32> {
        let offset = usize::try_from(gpu_va.checked_sub(self.gpu_va)?).ok()?;
        let raw = self.bytes.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

impl GpuAllocation for HostAllocation {
    fn gpu_va(&self) -> u64 {
        self.gpu_va
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn heap(&self) -> GpuHeap {
        self.heap
    }
}

/// Uploader that keeps every allocation in host memory
#[derive(Debug)]
pub struct HostUploader {
    next_gpu_va: u64,
    /// Remaining bytes, or unlimited
    capacity: Option<u64>,
    uploads: Vec<HostAllocation>,
}

impl Default for HostUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl HostUploader {
    pub fn new() -> Self {
        Self { next_gpu_va: HOST_VA_BASE, capacity: None, uploads: Vec::new() }
    }

    /// Creates an uploader that fails once `capacity` bytes have been handed out
    pub fn with_capacity(capacity: u64) -> Self {
        Self { capacity: Some(capacity), ..Self::new() }
    }

    /// Every completed upload, oldest first
    pub fn uploads(&self) -> &[HostAllocation] {
        &self.uploads
    }
}

impl Uploader for HostUploader {
    type Transaction<'a> = HostUploadTransaction<'a>;

    fn begin_upload(&mut self, code: &[u8], request: &UploadRequest) -> Result<HostUploadTransaction<'_>, UploadError> {
        let ctx_offset = align_up(code.len() as u64, BLOCK_ALIGNMENT);
        let sh_offset = ctx_offset + align_up(u64::from(request.ctx_reg_count) * REG_PAIR_BYTES, BLOCK_ALIGNMENT);
        let total_size = sh_offset + u64::from(request.sh_reg_count) * REG_PAIR_BYTES;

        if let Some(available) = self.capacity {
            if total_size > available {
                return Err(UploadError::OutOfMemory { requested: total_size, available });
            }
        }

        let gpu_va = self.next_gpu_va;
        Ok(HostUploadTransaction {
            gpu_va,
            heap: request.heap,
            code: Bytes::copy_from_slice(code),
            ctx_offset,
            sh_offset,
            total_size,
            ctx_capacity: request.ctx_reg_count,
            sh_capacity: request.sh_reg_count,
            ctx_regs: Vec::with_capacity(request.ctx_reg_count as usize),
            sh_regs: Vec::with_capacity(request.sh_reg_count as usize),
            uploader: self,
        })
    }
}

/// Upload transaction of [`HostUploader`]
#[derive(Debug)]
pub struct HostUploadTransaction<'a> {
    uploader: &'a mut HostUploader,
    gpu_va: u64,
    heap: GpuHeap,
    code: Bytes,
    ctx_offset: u64,
    sh_offset: u64,
    total_size: u64,
    ctx_capacity: u32,
    sh_capacity: u32,
    ctx_regs: Vec<(u32, u32)>,
    sh_regs: Vec<(u32, u32)>,
}

impl UploadTransaction for HostUploadTransaction<'_> {
    fn code_gpu_va(&self) -> u64 {
        self.gpu_va
    }

    fn code_size(&self) -> u64 {
        self.code.len() as u64
    }

    fn enable_load_index_path(&self) -> bool {
        self.ctx_capacity != 0 && self.sh_capacity != 0
    }

    fn add_ctx_reg(&mut self, addr: u16, value: u32) {
        debug_assert!(addr >= CONTEXT_SPACE_START);
        self.ctx_regs.push((u32::from(addr - CONTEXT_SPACE_START), value));
    }

    fn add_sh_reg(&mut self, addr: u16, value: u32) {
        debug_assert!(addr >= PERSISTENT_SPACE_START && addr < CONTEXT_SPACE_START);
        self.sh_regs.push((u32::from(addr - PERSISTENT_SPACE_START), value));
    }

    fn ctx_reg_gpu_va(&self) -> u64 {
        self.gpu_va + self.ctx_offset
    }

    fn sh_reg_gpu_va(&self) -> u64 {
        self.gpu_va + self.sh_offset
    }

    fn ctx_reg_count(&self) -> u32 {
        self.ctx_regs.len() as u32
    }

    fn sh_reg_count(&self) -> u32 {
        self.sh_regs.len() as u32
    }

    fn end(self) -> Result<Box<dyn GpuAllocation>, UploadError> {
        if self.ctx_reg_count() > self.ctx_capacity {
            return Err(UploadError::RegisterBlockOverflow { kind: RegisterBlockKind::Context, capacity: self.ctx_capacity, written: self.ctx_reg_count() });
        }
        if self.sh_reg_count() > self.sh_capacity {
            return Err(UploadError::RegisterBlockOverflow { kind: RegisterBlockKind::Sh, capacity: self.sh_capacity, written: self.sh_reg_count() });
        }

        let mut buf = BytesMut::zeroed(self.total_size as usize);
        buf[..self.code.len()].copy_from_slice(&self.code);

        let mut ctx_block = &mut buf[self.ctx_offset as usize..self.sh_offset as usize];
        for (offset, value) in &self.ctx_regs {
            ctx_block.put_u32_le(*offset);
            ctx_block.put_u32_le(*value);
        }
        let mut sh_block = &mut buf[self.sh_offset as usize..];
        for (offset, value) in &self.sh_regs {
            sh_block.put_u32_le(*offset);
            sh_block.put_u32_le(*value);
        }

        let allocation = HostAllocation { gpu_va: self.gpu_va, heap: self.heap, bytes: buf.freeze() };

        let uploader = self.uploader;
        uploader.next_gpu_va += align_up(self.total_size.max(1), HOST_VA_GRANULARITY);
        if let Some(available) = uploader.capacity.as_mut() {
            *available -= self.total_size;
        }
        uploader.uploads.push(allocation.clone());

        Ok(Box::new(allocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ctx: u32, sh: u32) -> UploadRequest {
        UploadRequest { ctx_reg_count: ctx, sh_reg_count: sh, heap: GpuHeap::Invisible }
    }

    #[test]
    fn test_register_blocks_hold_offset_value_pairs() {
        let mut uploader = HostUploader::new();
        let mut tx = uploader.begin_upload(&[0xAB; 300], &request(2, 1)).unwrap();
        assert!(tx.enable_load_index_path());

        tx.add_ctx_reg(0xA2D5, 0x11);
        tx.add_ctx_reg(0xA290, 0x22);
        tx.add_sh_reg(0x2C47, 0x33);

        let ctx_va = tx.ctx_reg_gpu_va();
        let sh_va = tx.sh_reg_gpu_va();
        assert_eq!(ctx_va % BLOCK_ALIGNMENT, 0);
        assert_eq!(ctx_va - tx.code_gpu_va(), 512);

        tx.end().unwrap();
        let allocation = &uploader.uploads()[0];
        assert_eq!(allocation.read_dword(ctx_va), Some(0x2D5));
        assert_eq!(allocation.read_dword(ctx_va + 4), Some(0x11));
        assert_eq!(allocation.read_dword(ctx_va + 8), Some(0x290));
        assert_eq!(allocation.read_dword(sh_va), Some(0x47));
        assert_eq!(allocation.read_dword(sh_va + 4), Some(0x33));
        assert_eq!(allocation.bytes()[299], 0xAB);
    }

    #[test]
    fn test_set_path_only_uploads_code() {
        let mut uploader = HostUploader::new();
        let tx = uploader.begin_upload(&[1, 2, 3, 4], &request(0, 0)).unwrap();
        assert!(!tx.enable_load_index_path());
        let allocation = tx.end().unwrap();
        assert_eq!(allocation.gpu_va(), HOST_VA_BASE);

        let tx = uploader.begin_upload(&[5, 6], &request(0, 0)).unwrap();
        assert_eq!(tx.code_gpu_va(), HOST_VA_BASE + HOST_VA_GRANULARITY);
    }

    #[test]
    fn test_overflowing_register_block_fails() {
        let mut uploader = HostUploader::new();
        let mut tx = uploader.begin_upload(&[], &request(1, 1)).unwrap();
        tx.add_ctx_reg(0xA2D5, 1);
        tx.add_ctx_reg(0xA290, 2);

        let err = tx.end().unwrap_err();
        assert_eq!(err, UploadError::RegisterBlockOverflow { kind: RegisterBlockKind::Context, capacity: 1, written: 2 });
        assert!(uploader.uploads().is_empty());
    }

    #[test]
    fn test_out_of_memory() {
        let mut uploader = HostUploader::with_capacity(64);
        let err = uploader.begin_upload(&[0; 128], &request(0, 0)).unwrap_err();
        // Code is padded to the block alignment
        assert_eq!(err, UploadError::OutOfMemory { requested: 256, available: 64 });
    }
}
