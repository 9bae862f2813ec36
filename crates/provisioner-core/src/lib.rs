// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioner Core - Runtime Provisioning Persistence
//!
//! This crate is the persistence and orchestration core of a cluster
//! provisioner. It records the lifecycle of managed runtimes (clusters) as
//! operation rows in a relational store and reconstructs authoritative
//! runtime status from the stored row graph. The GraphQL transport and the
//! infrastructure actuator that drives clusters to their desired state are
//! external consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 External Consumers                       │
//! │        (API resolvers, infrastructure actuator)          │
//! └─────────────────────────────────────────────────────────┘
//!                │                         │
//!                ▼                         ▼
//! ┌───────────────────────┐   ┌───────────────────────────┐
//! │    RuntimeService     │   │     OperationService      │
//! │  provisioning starts  │   │   terminal transitions    │
//! │  status reconstruction│   │   (Succeeded / Failed)    │
//! └───────────────────────┘   └───────────────────────────┘
//!                │                         │
//!                └──────────┬──────────────┘
//!                           ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SessionFactory                        │
//! │   ReadSession / WriteSession / TransactionalWriteSession │
//! └─────────────────────────────────────────────────────────┘
//!                │                         │
//!                ▼                         ▼
//! ┌───────────────────────┐   ┌───────────────────────────┐
//! │      PostgreSQL       │   │          SQLite           │
//! │     (production)      │   │   (embedded and tests)    │
//! └───────────────────────┘   └───────────────────────────┘
//! ```
//!
//! # Operation state machine
//!
//! Every lifecycle event (provision, upgrade, deprovision) is one operation
//! row:
//!
//! | Transition | Trigger |
//! |------------|---------|
//! | (created) → `InProgress` | `set_provisioning_started`, `set_upgrade_started`, `set_deprovisioning_started` |
//! | `InProgress` → `Succeeded` | `OperationService::set_as_succeeded` |
//! | `InProgress` → `Failed` | `OperationService::set_as_failed` |
//!
//! `Succeeded` and `Failed` are terminal. Repeating a transition to the same
//! terminal state is a no-op; flipping between terminal states is an error.
//!
//! # Atomicity
//!
//! `set_provisioning_started` inserts the cluster row, exactly one backend
//! configuration (Gardener or GCP), the Kyma configuration with its modules,
//! and the initial operation inside a single database transaction. A failure
//! at any step rolls everything back, so other sessions never observe a
//! partial cluster.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod migrations;
pub mod model;
pub mod operations;
pub mod repair;
pub mod service;
pub mod session;
pub mod uuid;
