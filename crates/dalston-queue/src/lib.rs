// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dalston-queue: the durable per-stage task queue (§4.2) and the
//! dual-transport event bus (§4.3), both built on Redis.

mod counter;
mod event_bus;
mod guard;
mod stream_queue;

pub use counter::{ConcurrencyCounter, CounterError, RedisConcurrencyCounter};
pub use event_bus::{BusError, EventBus, RedisEventBus, DURABLE_GROUP};
pub use guard::{
    cancel_marker_key, decrement_once_key, reconciler_lock_key, DistributedGuard, GuardError,
    RedisDistributedGuard, CANCEL_MARKER_TTL, DECREMENT_ONCE_TTL,
};
pub use stream_queue::{
    default_timeout_at, EnqueueFields, QueueError, RedisTaskQueue, TaskQueue, CONSUMER_GROUP,
    DEFAULT_STALE_THRESHOLD, MAX_DELIVERY_ADVISORY,
};

#[cfg(any(test, feature = "test-support"))]
pub use counter::fake::FakeConcurrencyCounter;
#[cfg(any(test, feature = "test-support"))]
pub use event_bus::fake::FakeEventBus;
#[cfg(any(test, feature = "test-support"))]
pub use guard::fake::FakeDistributedGuard;
#[cfg(any(test, feature = "test-support"))]
pub use stream_queue::fake::FakeTaskQueue;
