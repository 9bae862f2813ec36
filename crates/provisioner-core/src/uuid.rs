// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier generation behind a trait, so tests can pin IDs.

use uuid::Uuid;

/// Source of fresh entity identifiers.
///
/// The orchestration layer assigns every ID it stores (config rows, module
/// rows, operations) through this trait, which keeps workflows deterministic
/// under test.
pub trait UuidGenerator: Send + Sync {
    /// Produce a new unique identifier.
    fn new_uuid(&self) -> String;
}

/// Production generator backed by random (v4) UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn new_uuid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
