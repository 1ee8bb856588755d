// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! DMA memory mapping between host and DSP address space.
//!
//! Each submitted buffer triggers up to three map operations (payload,
//! side-parameter block, communication record); all three are unwound
//! before the owning slot is released.

use tracing::warn;

use crate::{
    Error, Result,
    bridge::{Bridge, HostPtr, MappedRegion, ProcessorHandle, ReservedRegion},
};

/// DSP MMU page size in bytes.
pub const DMM_PAGE_SIZE: usize = 4096;

/// A live host-to-DSP mapping together with its backing reservation.
#[derive(Debug, Clone, Copy)]
pub struct MappedBuffer {
    /// Host address the mapping was made from.
    pub host: HostPtr,
    /// Mapped length in bytes.
    pub size: usize,
    /// The reserved DSP address-space region backing the mapping.
    pub reserved: ReservedRegion,
    /// The live mapping inside the reserved region.
    pub mapped: MappedRegion,
}

impl MappedBuffer {
    /// The DSP-side address of the mapping, as seen by the node.
    pub fn dsp_address(&self) -> u32 {
        self.mapped.0
    }
}

/// Rounds `size` up to a whole number of DSP MMU pages.
fn round_to_page(size: usize) -> usize {
    size.div_ceil(DMM_PAGE_SIZE) * DMM_PAGE_SIZE
}

/// Reserves DSP address space and maps `size` bytes at `host` into it.
///
/// The reservation is page-rounded and padded by two pages of alignment
/// slack. If the map step fails, the reservation is released before the
/// error returns, so a failed call leaves no DSP address space behind.
///
/// # Errors
///
/// - [`Error::BadParameter`] if `host` is null or `size` is zero
/// - [`Error::InsufficientResources`] if reservation or mapping fails
pub fn map(
    bridge: &dyn Bridge,
    processor: ProcessorHandle,
    host: HostPtr,
    size: usize,
) -> Result<MappedBuffer> {
    if host.is_null() || size == 0 {
        return Err(Error::BadParameter);
    }

    let reserve_size = round_to_page(size) + 2 * DMM_PAGE_SIZE;
    let reserved = bridge
        .reserve(processor, reserve_size)
        .map_err(|_| Error::InsufficientResources)?;

    match bridge.map(processor, host, size, reserved) {
        Ok(mapped) => Ok(MappedBuffer {
            host,
            size,
            reserved,
            mapped,
        }),
        Err(error) => {
            if let Err(unreserve_error) = bridge.unreserve(processor, reserved) {
                warn!(
                    ?unreserve_error,
                    "failed to release reservation after map failure"
                );
            }
            warn!(?error, size, "DMA map failed");
            Err(Error::InsufficientResources)
        }
    }
}

/// Tears down a mapping and releases its reservation.
///
/// Best-effort: a failed unmap does not skip the unreserve step, since the
/// node may already be torn down when cleanup runs. Failures are logged and
/// the first one is returned.
pub fn unmap(bridge: &dyn Bridge, processor: ProcessorHandle, buffer: MappedBuffer) -> Result<()> {
    let unmap_result = bridge.unmap(processor, buffer.mapped);
    if let Err(error) = &unmap_result {
        warn!(?error, dsp_address = buffer.mapped.0, "DMA unmap failed");
    }

    let unreserve_result = bridge.unreserve(processor, buffer.reserved);
    if let Err(error) = &unreserve_result {
        warn!(?error, region = buffer.reserved.0, "DMA unreserve failed");
    }

    unmap_result.and(unreserve_result)
}
