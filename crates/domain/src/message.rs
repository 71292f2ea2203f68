//! Thin wrapper around `hickory_proto::op::Message` exposing exactly the
//! header/EDNS bits this crate's pipeline needs to reason about.

use crate::errors::DomainError;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};

/// A decoded DNS message plus the accessors the pipeline needs for AD/DO
/// bit discipline and single-question validation.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub message: Message,
}

impl WireMessage {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    /// The single question of this message. All processing assumes
    /// exactly one question; violating messages are not cacheable and
    /// yield format errors where applicable.
    pub fn single_question(&self) -> Result<&Query, DomainError> {
        match self.message.queries() {
            [single] => Ok(single),
            other => Err(DomainError::InvalidDnsMessage(format!(
                "expected exactly one question, found {}",
                other.len()
            ))),
        }
    }

    pub fn has_single_question(&self) -> bool {
        self.message.queries().len() == 1
    }

    pub fn truncated(&self) -> bool {
        self.message.truncated()
    }

    pub fn rcode(&self) -> ResponseCode {
        self.message.response_code()
    }

    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.message.set_response_code(rcode);
    }

    /// The `AuthenticatedData` (AD) header bit.
    pub fn ad(&self) -> bool {
        self.message.header().authentic_data()
    }

    pub fn set_ad(&mut self, ad: bool) {
        self.message.header_mut().set_authentic_data(ad);
    }

    /// The EDNS `DO` (DNSSEC OK) bit. `false` if the message carries no OPT
    /// record (no EDNS support signaled).
    pub fn dnssec_ok(&self) -> bool {
        self.message
            .extensions()
            .as_ref()
            .map(|edns| edns.dnssec_ok())
            .unwrap_or(false)
    }

    pub fn set_dnssec_ok(&mut self, ok: bool) {
        if let Some(edns) = self.message.extensions_mut() {
            edns.set_dnssec_ok(ok);
        }
    }

    /// The decoded ECS option carried in this message's OPT record, if any.
    pub fn ecs_option(&self) -> Option<&EdnsOption> {
        self.message
            .extensions()
            .as_ref()
            .and_then(|edns| edns.options().get(EdnsCode::Subnet))
    }
}
