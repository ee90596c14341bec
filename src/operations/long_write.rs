//! Chunked characteristic write.
//!
//! ```text
//!  subscribe(write completions)
//!        │
//!        ▼
//!  ┌─▶ write payload[offset..offset+batch] ── refused ──▶ CannotStart
//!  │     │
//!  │     ▼
//!  │   first completion for this characteristic ── timeout ──▶ Timeout
//!  │     │                                     └─ bad status ─▶ Gatt
//!  │     ▼
//!  │   strategy.on_batch_written(has_remaining)
//!  │     │
//!  └─────┤ bytes remain
//!        ▼
//!  emit(payload), complete
//! ```
//!
//! The completion subscription is taken once, before the first write, so a
//! completion that races ahead of the write call is never missed. When the
//! caller drops its stream no further batch is sent and the queue is
//! released without delivering anything.

use core::ops::Range;
use core::time::Duration;
use std::sync::Arc;

use log::{debug, trace};

use super::ack::{AckDecision, AckStrategy};
use crate::error::{BleError, GattOperation};
use crate::gatt::{CharacteristicEvent, GATT_SUCCESS, GattCallback, GattListener, Uuid};
use crate::ports::GattLink;
use crate::queue::{Operation, ReleasingEmitter};
use crate::runtime;

/// Offset cursor over the payload. Only ever moves forward.
#[derive(Debug, Clone)]
pub struct BatchCursor {
    offset: usize,
    len: usize,
    batch: usize,
}

impl BatchCursor {
    /// `batch` must be non-zero.
    pub fn new(len: usize, batch: usize) -> Self {
        debug_assert!(batch > 0);
        Self {
            offset: 0,
            len,
            batch,
        }
    }

    pub fn next_range(&mut self) -> Option<Range<usize>> {
        if self.offset >= self.len {
            return None;
        }
        let end = self.len.min(self.offset + self.batch);
        let range = self.offset..end;
        self.offset = end;
        Some(range)
    }

    pub fn has_remaining(&self) -> bool {
        self.offset < self.len
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

pub struct LongWriteOperation<S> {
    pub(crate) link: Arc<dyn GattLink>,
    pub(crate) callback: GattCallback,
    pub(crate) characteristic: Uuid,
    pub(crate) payload: Vec<u8>,
    pub(crate) batch_size: usize,
    pub(crate) strategy: S,
    pub(crate) timeout: Duration,
}

impl<S: AckStrategy> LongWriteOperation<S> {
    pub fn new(
        link: Arc<dyn GattLink>,
        callback: GattCallback,
        characteristic: Uuid,
        payload: Vec<u8>,
        batch_size: usize,
        strategy: S,
        timeout: Duration,
    ) -> Self {
        Self {
            link,
            callback,
            characteristic,
            payload,
            batch_size,
            strategy,
            timeout,
        }
    }
}

async fn next_completion(
    acks: &GattListener<CharacteristicEvent>,
    characteristic: Uuid,
) -> Result<CharacteristicEvent, BleError> {
    loop {
        let event = acks.next().await?;
        if event.uuid == characteristic {
            return Ok(event);
        }
    }
}

impl<S: AckStrategy> Operation for LongWriteOperation<S> {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "CharacteristicLongWrite"
    }

    async fn run(self, emitter: ReleasingEmitter<Vec<u8>>) -> Result<(), BleError> {
        let Self {
            link,
            callback,
            characteristic,
            payload,
            batch_size,
            mut strategy,
            timeout,
        } = self;

        if batch_size == 0 {
            return Err(BleError::InvalidArgument("long write batch size must be non-zero"));
        }

        let address = link.address().clone();
        let operation = GattOperation::CharacteristicLongWrite;
        let acks = callback.characteristic_writes();
        let mut cursor = BatchCursor::new(payload.len(), batch_size);
        let mut batch_no = 0usize;

        while let Some(range) = cursor.next_range() {
            if emitter.is_disposed() {
                break;
            }
            batch_no += 1;
            trace!(
                "{}: {} batch #{} bytes {}..{} of {}",
                address,
                characteristic,
                batch_no,
                range.start,
                range.end,
                payload.len()
            );

            match link.write_characteristic(characteristic, &payload[range]) {
                Ok(true) => {}
                Ok(false) => return Err(BleError::CannotStart { operation, address }),
                Err(dead) => return Err(dead.into_error(&address)),
            }

            let Some(completion) = emitter
                .or_disposed(runtime::timeout(timeout, next_completion(&acks, characteristic)))
                .await
            else {
                break;
            };
            let event = completion.map_err(|_| BleError::Timeout {
                operation,
                address: address.clone(),
            })??;
            if event.status != GATT_SUCCESS {
                return Err(BleError::Gatt {
                    operation,
                    address,
                    status: event.status,
                });
            }

            let has_remaining = cursor.has_remaining();
            let Some(decision) = emitter
                .or_disposed(strategy.on_batch_written(has_remaining))
                .await
            else {
                break;
            };
            if decision? == AckDecision::Stop && has_remaining {
                return Err(BleError::AckStrategy("stopped before the payload was written"));
            }
        }

        if cursor.has_remaining() {
            debug!(
                "{}: long write detached after {} of {} bytes",
                address,
                cursor.offset(),
                payload.len()
            );
            emitter.release();
            return Ok(());
        }

        emitter.next(payload);
        emitter.complete();
        Ok(())
    }
}
