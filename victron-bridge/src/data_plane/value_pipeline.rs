/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Per-listener value transform between bus updates and outbound messages.

use crate::bus::BusUpdate;
use crate::config::{InputAdapterConfig, PathMetadata};
use crate::host::{NodeStatus, OutboundMessage, StatusFill, StatusShape};
use crate::observability::fields;
use crate::routing::context_key::context_key;
use crate::routing::service_address::ServiceAddress;
use serde_json::Value;

/// Why an update was not forwarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SuppressReason {
    /// Re-announced value after the initial value was already sent.
    Unchanged,
    /// Value equals the last forwarded value.
    Duplicate,
}

impl SuppressReason {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::Unchanged => fields::REASON_ONLY_CHANGES,
            SuppressReason::Duplicate => fields::REASON_DUPLICATE_VALUE,
        }
    }
}

/// Side effects of one forwarded update, applied by the adapter in field order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Delivery {
    pub(crate) context: Option<(String, Value)>,
    pub(crate) message: OutboundMessage,
    pub(crate) status: Option<NodeStatus>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct ListenerState {
    previous_value: Option<Value>,
    sent_initial_value: bool,
}

pub(crate) struct ValuePipeline {
    only_changes: bool,
    round_precision: Option<usize>,
    path_metadata: PathMetadata,
    topic: String,
    /// `None` when context mirroring is disabled.
    context_key: Option<String>,
    show_values: bool,
    state: ListenerState,
}

impl ValuePipeline {
    pub(crate) fn new(
        config: &InputAdapterConfig,
        address: &ServiceAddress,
        mirror_to_context: bool,
        show_values: bool,
    ) -> Self {
        Self {
            only_changes: config.only_changes,
            round_precision: config.round_precision(),
            path_metadata: config.path_metadata.clone(),
            topic: config.topic(),
            context_key: mirror_to_context
                .then(|| context_key(address.service(), address.path())),
            show_values,
            state: ListenerState::default(),
        }
    }

    pub(crate) fn process(&mut self, update: BusUpdate) -> Result<Delivery, SuppressReason> {
        if self.only_changes && !update.changed && self.state.sent_initial_value {
            return Err(SuppressReason::Unchanged);
        }

        let value = match self.round_precision {
            Some(precision) => round_value(update.value, precision),
            None => update.value,
        };

        if self.only_changes
            && self
                .state
                .previous_value
                .as_ref()
                .is_some_and(|previous| same_value(previous, &value))
        {
            return Err(SuppressReason::Duplicate);
        }

        let context = self
            .context_key
            .as_ref()
            .map(|key| (key.clone(), value.clone()));
        self.state.previous_value = Some(value.clone());

        let (textvalue, text) = if self.path_metadata.is_enum() {
            let label = self.path_metadata.enum_label(&value);
            (
                Some(label.unwrap_or_default().to_string()),
                fields::format_enum_value(&value, label),
            )
        } else {
            (None, fields::format_value(&value))
        };

        let message = OutboundMessage {
            payload: value,
            topic: self.topic.clone(),
            textvalue,
        };
        let status = self
            .show_values
            .then(|| NodeStatus::new(StatusFill::Green, StatusShape::Dot, text));

        self.state.sent_initial_value = true;
        Ok(Delivery {
            context,
            message,
            status,
        })
    }
}

/// Numbers compare by numeric value, so `5` and `5.0` are the same value.
fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (left.as_f64(), right.as_f64()) {
            (Some(left), Some(right)) => left == right,
            _ => left == right,
        },
        _ => left == right,
    }
}

/// Enough fraction digits to print any finite `f64` exactly.
const F64_EXACT_FRACTION_DIGITS: usize = 1074;

/// Rounds floating-point numbers to `precision` decimals; integers and non-numeric
/// values pass through untouched.
///
/// Exact ties on the binary value round away from zero, so `2.5` becomes `3` while
/// `1.005` (stored just below the tie) becomes `1.0`.
pub(crate) fn round_value(value: Value, precision: usize) -> Value {
    let Value::Number(number) = &value else {
        return value;
    };
    if number.is_i64() || number.is_u64() {
        return value;
    }

    number
        .as_f64()
        .and_then(|float| round_half_away_from_zero(float, precision))
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(value)
}

fn round_half_away_from_zero(float: f64, precision: usize) -> Option<f64> {
    if !float.is_finite() || precision >= F64_EXACT_FRACTION_DIGITS {
        return None;
    }

    let exact = format!("{:.*}", F64_EXACT_FRACTION_DIGITS, float.abs());
    let (integer, fraction) = exact.split_once('.')?;
    let mut digits: Vec<u8> = integer
        .bytes()
        .chain(fraction.bytes().take(precision))
        .collect();
    let mut integer_len = integer.len();

    if fraction
        .as_bytes()
        .get(precision)
        .is_some_and(|digit| *digit >= b'5')
    {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
            integer_len += 1;
        }
    }

    let (integer, fraction) = digits.split_at(integer_len);
    let rounded = format!(
        "{}.{}",
        String::from_utf8_lossy(integer),
        String::from_utf8_lossy(fraction)
    )
    .trim_end_matches('.')
    .parse::<f64>()
    .ok()?;

    // `-0.4` rounds to zero, not negative zero.
    Some(if float < 0.0 && rounded != 0.0 {
        -rounded
    } else {
        rounded
    })
}
