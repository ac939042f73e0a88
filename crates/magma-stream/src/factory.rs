//! # Strategy Factory
//!
//! Probes device capabilities in priority order and builds the first
//! streaming strategy that can actually be created.

use arrayvec::ArrayVec;

use magma_core::{BufferTarget, DeviceCaps, Error, GpuBackend, Result};

use crate::config::StreamConfig;
use crate::persistent::PersistentMappedBuffer;
use crate::staging::{DiscardReplaceBuffer, ShadowCopyBuffer};
use crate::stream::{StrategyKind, StreamBuffer};

/// Strategies `caps` advertises, best first
pub fn probe_order(caps: DeviceCaps, config: &StreamConfig) -> ArrayVec<StrategyKind, 3> {
    let mut order = ArrayVec::new();

    if caps.supports_persistent_streaming() {
        order.push(StrategyKind::PersistentMapped);
    }

    let staging = if config.prefer_sub_data {
        [StrategyKind::ShadowCopy, StrategyKind::DiscardAndReplace]
    } else {
        [StrategyKind::DiscardAndReplace, StrategyKind::ShadowCopy]
    };
    for kind in staging {
        let required = match kind {
            StrategyKind::DiscardAndReplace => DeviceCaps::BUFFER_ORPHANING,
            StrategyKind::ShadowCopy => DeviceCaps::BUFFER_SUB_DATA,
            StrategyKind::PersistentMapped => continue,
        };
        if caps.contains(required) {
            order.push(kind);
        }
    }

    order
}

fn build<B: GpuBackend>(
    kind: StrategyKind,
    backend: B,
    target: BufferTarget,
    size: u32,
    config: &StreamConfig,
) -> Result<StreamBuffer<B>> {
    Ok(match kind {
        StrategyKind::PersistentMapped => StreamBuffer::PersistentMapped(
            PersistentMappedBuffer::create(backend, target, size, config)?,
        ),
        StrategyKind::DiscardAndReplace => {
            StreamBuffer::DiscardAndReplace(DiscardReplaceBuffer::create(backend, target, size)?)
        }
        StrategyKind::ShadowCopy => {
            StreamBuffer::ShadowCopy(ShadowCopyBuffer::create(backend, target, size)?)
        }
    })
}

/// Build the best streaming buffer the device can create.
///
/// Each candidate is really created; a failure releases whatever it had
/// allocated and moves on to the next. Fails with [`Error::NoStreamBuffer`]
/// once every candidate has failed.
pub fn create<B: GpuBackend>(
    backend: B,
    target: BufferTarget,
    size: u32,
    config: &StreamConfig,
) -> Result<StreamBuffer<B>> {
    if size == 0 {
        return Err(Error::InvalidParameter);
    }

    let label = config.display_label();
    let order = probe_order(backend.capabilities(), config);
    if order.is_empty() {
        log::warn!("{}: device advertises no streaming strategy", label);
    }

    for kind in order {
        match build(kind, backend.clone(), target, size, config) {
            Ok(stream) => {
                log::info!(
                    "{}: streaming {} bytes of {} data via {}",
                    label,
                    size,
                    target,
                    kind
                );
                return Ok(stream);
            }
            Err(err) => {
                log::warn!("{}: {} unavailable ({}), falling back", label, kind, err);
            }
        }
    }

    log::error!("{}: no streaming strategy could be created", label);
    Err(Error::NoStreamBuffer)
}
