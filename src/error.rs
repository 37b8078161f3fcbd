/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * error.rs - Failure kinds of a single query/response exchange.
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
use std::error;
use std::io;

use hickory_proto::error::ProtoError;
use thiserror::Error;

/// Everything that can go wrong between receiving a DNS request and writing
/// the reply. Only `Write` escapes the orchestrator; the rest become a
/// failure reply to the client.
#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("malformed DNS request: {0}")]
  MalformedRequest(#[source] ProtoError),

  #[error("no question found in query")]
  NoQuestion,

  #[error("error setting up upstream request: {0}")]
  RequestConstruction(String),

  #[error("error sending upstream request: {0}")]
  UpstreamTransport(#[source] Box<dyn error::Error + Send + Sync>),

  #[error("malformed JSON DNS response: {0}")]
  MalformedResponse(#[from] serde_json::Error),

  #[error("cannot synthesize record from `{line}`: {reason}")]
  RecordSynthesis { line: String, reason: String },

  #[error("response has {response} questions but the request only has {request}")]
  CompositionAlignment { response: usize, request: usize },

  #[error("invalid question name `{name}`: {reason}")]
  QuestionName { name: String, reason: String },

  #[error("error encoding DNS response: {0}")]
  Encode(#[source] ProtoError),

  #[error("error writing DNS response: {0}")]
  Write(#[from] io::Error),
}
