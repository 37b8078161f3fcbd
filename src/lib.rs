/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * lib.rs - DNS to JSON DNS-over-HTTPS translation.
 *
 * This file is part of dns-json-proxy.
 *
 * Copyright 2017-2018 Michael Farrell <micolous+git@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Answers plain DNS queries by asking a JSON DNS-over-HTTPS resolver
//! (`GET <endpoint>?name=..&type=..`) and rebuilding a DNS reply from the
//! JSON it sends back.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod compose;
pub mod config;
pub mod dnsserver;
pub mod error;
pub mod pdns;
pub mod proxy;
pub mod rr;

pub use compose::DnsRequest;
pub use config::{Config, RecordPolicy};
pub use dnsserver::{DnsServer, ServerHandle};
pub use error::ProxyError;
pub use pdns::Pdns;
pub use proxy::{Proxy, ResponseWriter, Upstream};
