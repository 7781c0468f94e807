//! Canonical charge and refund values
//!
//! These are processor-independent: adapters build them from processor
//! payloads, business logic only ever sees these.

use super::amount::Amount;
use super::flow_of_funds::FlowOfFunds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a charge splits money between the platform and a connected account
///
/// Computed once per charge by the topology classifier and carried on the
/// [`Charge`]; call sites never re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeTopology {
    /// Destination charge with a legacy `application_fee_amount`
    DestinationWithApplicationFee,

    /// Destination charge using `transfer_data[amount]`; the platform keeps
    /// the remainder
    DestinationWithTransferData,

    /// Direct charge carrying an application fee, no destination
    ApplicationFeeOnly,

    /// Plain platform charge
    NoDestination,
}

impl ChargeTopology {
    pub fn has_destination(self) -> bool {
        matches!(
            self,
            ChargeTopology::DestinationWithApplicationFee
                | ChargeTopology::DestinationWithTransferData
        )
    }
}

impl fmt::Display for ChargeTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChargeTopology::DestinationWithApplicationFee => "destination_with_application_fee",
            ChargeTopology::DestinationWithTransferData => "destination_with_transfer_data",
            ChargeTopology::ApplicationFeeOnly => "application_fee_only",
            ChargeTopology::NoDestination => "no_destination",
        };
        write!(f, "{}", name)
    }
}

/// Canonical charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,

    /// Amount charged to the buyer, buyer-facing currency
    pub amount: Amount,

    /// Connected account receiving the funds (`destination` or
    /// `transfer_data.destination`)
    pub destination: Option<String>,

    pub on_behalf_of: Option<String>,

    /// `transfer_data[amount]`, in the charge currency
    pub transfer_data_amount: Option<i64>,

    /// Transfer to the destination account
    pub transfer_id: Option<String>,

    pub application_fee_id: Option<String>,

    /// Connected account the application fee was collected from
    pub application_fee_account: Option<String>,

    pub payment_intent_id: Option<String>,

    pub metadata: BTreeMap<String, String>,

    pub topology: ChargeTopology,
}

impl Charge {
    pub fn has_destination(&self) -> bool {
        self.topology.has_destination()
    }
}

/// Canonical refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub charge_id: String,
    pub flow_of_funds: FlowOfFunds,
}
