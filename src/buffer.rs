//! Move-only buffer handles for cross-thread result transfer.
//!
//! A [`BufferHandle`] wraps a raw pixel region or an encoded tile byte
//! stream and tracks which side of the thread boundary currently owns it.
//! Transfer is a move, never a copy; the only way to copy the contents is
//! the explicit [`BufferHandle::duplicate`] call.
//!
//! # Ownership state machine
//!
//! ```text
//! Unbound ──allocate──▶ OwnedByWorker ──finish──▶ InTransit
//!                                                     │ receive
//!                                                     ▼
//!                        Released ◀──release── OwnedByHost
//! ```
//!
//! Accessing a handle outside the owned state for the calling side is a
//! programming error: a fatal assertion in debug builds, a structured
//! [`EngineError::BufferState`] in release builds.

use crate::error::EngineError;

/// Pixel layout of a raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel.
    Rgba8,
    /// 8-bit grayscale, 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// What the bytes in a buffer represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    /// Uncompressed pixels with explicit dimensions.
    RawPixels {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Pixel layout.
        pixel_format: PixelFormat,
    },
    /// An encoded vector tile byte stream.
    EncodedTile,
}

/// Ownership state of a buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Created but not yet backed by memory.
    Unbound,
    /// A worker thread holds exclusive mutable access.
    OwnedByWorker,
    /// Handed to the completion dispatcher; neither side may touch it.
    InTransit,
    /// The host event loop holds exclusive access.
    OwnedByHost,
    /// Contents surrendered; the handle is inert.
    Released,
}

impl BufferState {
    fn name(&self) -> &'static str {
        match self {
            Self::Unbound => "Unbound",
            Self::OwnedByWorker => "OwnedByWorker",
            Self::InTransit => "InTransit",
            Self::OwnedByHost => "OwnedByHost",
            Self::Released => "Released",
        }
    }
}

/// Ownership-safe wrapper around a byte region, transferable across the
/// worker/host boundary exactly once.
///
/// Deliberately not `Clone`: exactly one side holds mutable access at any
/// instant.
#[derive(Debug)]
pub struct BufferHandle {
    data: Vec<u8>,
    format: BufferFormat,
    state: BufferState,
}

impl BufferHandle {
    /// Creates an unbound handle for the given format. Workers call
    /// [`allocate`](Self::allocate) (or use [`for_pixels`](Self::for_pixels) /
    /// [`from_encoded`](Self::from_encoded)) to back it with memory.
    pub fn unbound(format: BufferFormat) -> Self {
        Self {
            data: Vec::new(),
            format,
            state: BufferState::Unbound,
        }
    }

    /// Backs the handle with a zeroed region of `len` bytes and transfers
    /// ownership to the calling worker (Unbound → OwnedByWorker).
    pub fn allocate(&mut self, len: usize) -> Result<(), EngineError> {
        self.expect_state(BufferState::Unbound, "Unbound")?;
        self.data = vec![0; len];
        self.state = BufferState::OwnedByWorker;
        Ok(())
    }

    /// Allocates a zeroed, worker-owned pixel buffer sized for the given
    /// dimensions.
    pub fn for_pixels(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let len = width as usize * height as usize * pixel_format.bytes_per_pixel();
        Self {
            data: vec![0; len],
            format: BufferFormat::RawPixels {
                width,
                height,
                pixel_format,
            },
            state: BufferState::OwnedByWorker,
        }
    }

    /// Wraps an already-encoded tile as a worker-owned handle.
    pub fn from_encoded(data: Vec<u8>) -> Self {
        Self {
            data,
            format: BufferFormat::EncodedTile,
            state: BufferState::OwnedByWorker,
        }
    }

    /// Byte length of the region.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Format tag for the contents.
    pub fn format(&self) -> BufferFormat {
        self.format
    }

    /// Current ownership state.
    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Mutable access for the owning worker.
    pub fn worker_bytes_mut(&mut self) -> Result<&mut [u8], EngineError> {
        self.expect_state(BufferState::OwnedByWorker, "OwnedByWorker")?;
        Ok(&mut self.data)
    }

    /// Replaces the contents while worker-owned. Used by render jobs that
    /// receive an already-filled buffer from the renderer.
    pub fn fill(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        self.expect_state(BufferState::OwnedByWorker, "OwnedByWorker")?;
        self.data = data;
        Ok(())
    }

    /// Worker finished writing; hands the buffer to the dispatcher
    /// (OwnedByWorker → InTransit).
    pub(crate) fn finish(&mut self) -> Result<(), EngineError> {
        self.expect_state(BufferState::OwnedByWorker, "OwnedByWorker")?;
        self.state = BufferState::InTransit;
        Ok(())
    }

    /// Host side takes delivery (InTransit → OwnedByHost).
    pub(crate) fn receive(&mut self) -> Result<(), EngineError> {
        self.expect_state(BufferState::InTransit, "InTransit")?;
        self.state = BufferState::OwnedByHost;
        Ok(())
    }

    /// Read access for the owning host.
    pub fn bytes(&self) -> Result<&[u8], EngineError> {
        self.expect_state(BufferState::OwnedByHost, "OwnedByHost")?;
        Ok(&self.data)
    }

    /// Explicit copy of the contents for consumers that need a second
    /// owner. The handle itself remains host-owned.
    pub fn duplicate(&self) -> Result<Vec<u8>, EngineError> {
        self.expect_state(BufferState::OwnedByHost, "OwnedByHost")?;
        Ok(self.data.clone())
    }

    /// Surrenders the contents to the host (OwnedByHost → Released).
    pub fn into_bytes(mut self) -> Result<Vec<u8>, EngineError> {
        self.expect_state(BufferState::OwnedByHost, "OwnedByHost")?;
        self.state = BufferState::Released;
        Ok(std::mem::take(&mut self.data))
    }

    /// Drops the contents without reading them (OwnedByHost → Released).
    pub fn release(&mut self) -> Result<(), EngineError> {
        self.expect_state(BufferState::OwnedByHost, "OwnedByHost")?;
        self.data = Vec::new();
        self.state = BufferState::Released;
        Ok(())
    }

    fn expect_state(
        &self,
        expected: BufferState,
        expected_name: &'static str,
    ) -> Result<(), EngineError> {
        if self.state == expected {
            return Ok(());
        }
        debug_assert!(
            false,
            "buffer accessed in state {:?}, expected {}",
            self.state, expected_name
        );
        Err(EngineError::BufferState {
            actual: self.state.name(),
            expected: expected_name,
        })
    }
}
