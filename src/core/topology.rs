//! Charge topology classification
//!
//! The processor's API moved from an `application_fee_amount` parameter to a
//! `transfer_data[amount]` parameter for the same business concept, splitting
//! a charge between the platform and a creator. Both shapes are live at the
//! same time, so neither is treated as deprecated here.
//!
//! Decision table, first match wins:
//!
//! | has destination | application fee | topology                        |
//! |-----------------|-----------------|---------------------------------|
//! | yes             | yes             | `DestinationWithApplicationFee` |
//! | yes             | no              | `DestinationWithTransferData`   |
//! | no              | yes             | `ApplicationFeeOnly`            |
//! | no              | no              | `NoDestination`                 |

use crate::processor::payload::ChargeObject;
use crate::types::ChargeTopology;

/// The payload facts the classifier looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyInputs {
    pub has_destination: bool,
    pub application_fee_present: bool,
    pub transfer_data_present: bool,
    pub on_behalf_of_present: bool,
}

impl TopologyInputs {
    pub fn from_charge(charge: &ChargeObject) -> Self {
        TopologyInputs {
            has_destination: charge.destination.is_some() || charge.transfer_data.is_some(),
            application_fee_present: charge.application_fee.is_some()
                || charge.application_fee_amount.is_some(),
            transfer_data_present: charge.transfer_data.is_some(),
            on_behalf_of_present: charge.on_behalf_of.is_some(),
        }
    }
}

/// Classify a charge into exactly one topology
///
/// `transfer_data_present` and `on_behalf_of_present` do not change the
/// outcome; they are part of the inputs because later branches (refund
/// attribution) read them from the canonical charge.
pub fn classify(inputs: TopologyInputs) -> ChargeTopology {
    match (inputs.has_destination, inputs.application_fee_present) {
        (true, true) => ChargeTopology::DestinationWithApplicationFee,
        (true, false) => ChargeTopology::DestinationWithTransferData,
        (false, true) => ChargeTopology::ApplicationFeeOnly,
        (false, false) => ChargeTopology::NoDestination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn test_table_is_exhaustive(
        #[values(true, false)] has_destination: bool,
        #[values(true, false)] application_fee_present: bool,
        #[values(true, false)] transfer_data_present: bool,
        #[values(true, false)] on_behalf_of_present: bool,
    ) {
        let inputs = TopologyInputs {
            has_destination,
            application_fee_present,
            transfer_data_present,
            on_behalf_of_present,
        };

        let expected = match (has_destination, application_fee_present) {
            (true, true) => ChargeTopology::DestinationWithApplicationFee,
            (true, false) => ChargeTopology::DestinationWithTransferData,
            (false, true) => ChargeTopology::ApplicationFeeOnly,
            (false, false) => ChargeTopology::NoDestination,
        };
        assert_eq!(classify(inputs), expected);
        assert_eq!(classify(inputs).has_destination(), has_destination);
    }

    #[rstest]
    #[case::legacy_fee(
        json!({"destination": "acct_1", "application_fee_amount": 100}),
        ChargeTopology::DestinationWithApplicationFee
    )]
    #[case::fee_object(
        json!({"destination": "acct_1", "application_fee": "fee_1"}),
        ChargeTopology::DestinationWithApplicationFee
    )]
    #[case::transfer_data(
        json!({"transfer_data": {"destination": "acct_1", "amount": 900}}),
        ChargeTopology::DestinationWithTransferData
    )]
    #[case::direct_with_fee(
        json!({"application_fee": "fee_1"}),
        ChargeTopology::ApplicationFeeOnly
    )]
    #[case::platform(json!({}), ChargeTopology::NoDestination)]
    fn test_inputs_from_charge_payload(
        #[case] extra: serde_json::Value,
        #[case] expected: ChargeTopology,
    ) {
        let mut object = json!({"id": "ch_1", "amount": 1000, "currency": "usd"});
        if let (Some(base), Some(extra)) = (object.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        let charge: ChargeObject = serde_json::from_value(object).unwrap();

        assert_eq!(classify(TopologyInputs::from_charge(&charge)), expected);
    }
}
