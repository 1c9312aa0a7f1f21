// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library interface to tierctl
//!
//! tierctl manages a fixed three-tier topology on a cloud: a network with one
//! subnet, a router to the external network, web, app and db servers, and a
//! floating IP for the web server.  Every resource is identified by name and
//! re-resolved by name each time it's needed; the cloud is the only source of
//! truth.
//!
//! Each operation takes an explicit [`provider::CloudProvider`], so the same
//! code runs against OpenStack ([`openstack::OpenStackProvider`]) and against
//! the in-memory [`sim::SimCloud`] used by the tests.

pub mod config;
pub mod lifecycle;
pub mod openstack;
pub mod operation;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod sim;
pub mod status;
pub mod teardown;

pub use operation::Operation;
