//! Merchant account classification

use serde::{Deserialize, Serialize};

/// Who legally custodies settled funds before payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderOfFunds {
    /// No connected account: the platform holds the funds
    Platform,
    /// Platform-managed connect sub-account custodied by the processor
    Processor,
    /// Connect account owned by the creator
    Creator,
}

/// Resolved merchant, as returned by a `MerchantAccountLookup`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantAccount {
    pub merchant_id: String,
    pub processor_account_id: Option<String>,
    pub holder_of_funds: HolderOfFunds,
    pub is_migrated_to_direct_connect: bool,
}

impl MerchantAccount {
    /// The scope to try first for processor lookups
    ///
    /// Only merchants migrated to direct connect with a connected account get
    /// a connect scope; everything else goes straight to platform scope.
    pub fn connect_scope(&self) -> Option<&str> {
        if !self.is_migrated_to_direct_connect || self.holder_of_funds == HolderOfFunds::Platform
        {
            return None;
        }
        self.processor_account_id.as_deref()
    }
}
