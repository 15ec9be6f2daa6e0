/// Transmit timestamping mode of an adapter (`HWTSTAMP_TX_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Off,
    On,
    OneStepSync,
    OneStepP2p,
    Unknown(u32),
}

impl TxType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => TxType::Off,
            1 => TxType::On,
            2 => TxType::OneStepSync,
            3 => TxType::OneStepP2p,
            other => TxType::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            TxType::Off => 0,
            TxType::On => 1,
            TxType::OneStepSync => 2,
            TxType::OneStepP2p => 3,
            TxType::Unknown(other) => other,
        }
    }
}

/// Which received packets an adapter timestamps (`HWTSTAMP_FILTER_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxFilter {
    None,
    All,
    Some,
    PtpV1L4Event,
    PtpV1L4Sync,
    PtpV1L4DelayReq,
    PtpV2L4Event,
    PtpV2L4Sync,
    PtpV2L4DelayReq,
    PtpV2L2Event,
    PtpV2L2Sync,
    PtpV2L2DelayReq,
    PtpV2Event,
    PtpV2Sync,
    PtpV2DelayReq,
    NtpAll,
    Unknown(u32),
}

const RX_FILTERS: [RxFilter; 16] = [
    RxFilter::None,
    RxFilter::All,
    RxFilter::Some,
    RxFilter::PtpV1L4Event,
    RxFilter::PtpV1L4Sync,
    RxFilter::PtpV1L4DelayReq,
    RxFilter::PtpV2L4Event,
    RxFilter::PtpV2L4Sync,
    RxFilter::PtpV2L4DelayReq,
    RxFilter::PtpV2L2Event,
    RxFilter::PtpV2L2Sync,
    RxFilter::PtpV2L2DelayReq,
    RxFilter::PtpV2Event,
    RxFilter::PtpV2Sync,
    RxFilter::PtpV2DelayReq,
    RxFilter::NtpAll,
];

impl RxFilter {
    pub fn from_raw(raw: u32) -> Self {
        RX_FILTERS
            .get(raw as usize)
            .copied()
            .unwrap_or(RxFilter::Unknown(raw))
    }

    pub fn to_raw(self) -> u32 {
        match self {
            RxFilter::Unknown(other) => other,
            known => RX_FILTERS
                .iter()
                .position(|f| *f == known)
                .unwrap_or_default() as u32,
        }
    }
}

/// The modes we ask an adapter to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareTimestampRequest {
    pub tx_type: TxType,
    pub rx_filter: RxFilter,
}

impl Default for HardwareTimestampRequest {
    fn default() -> Self {
        Self {
            tx_type: TxType::On,
            rx_filter: RxFilter::All,
        }
    }
}

/// The modes an adapter actually applied. Drivers are free to pick something
/// else than what was requested, so never assume this equals the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareTimestampGrant {
    pub tx_type: TxType,
    pub rx_filter: RxFilter,
}

impl HardwareTimestampGrant {
    pub fn discrepancy(&self, request: &HardwareTimestampRequest) -> Option<GrantDiscrepancy> {
        let discrepancy = GrantDiscrepancy {
            tx_type: (self.tx_type != request.tx_type).then_some((request.tx_type, self.tx_type)),
            rx_filter: (self.rx_filter != request.rx_filter)
                .then_some((request.rx_filter, self.rx_filter)),
        };

        (discrepancy.tx_type.is_some() || discrepancy.rx_filter.is_some()).then_some(discrepancy)
    }
}

/// Requested and granted values for each mode that did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantDiscrepancy {
    pub tx_type: Option<(TxType, TxType)>,
    pub rx_filter: Option<(RxFilter, RxFilter)>,
}

impl std::fmt::Display for GrantDiscrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut separator = "";

        if let Some((requested, granted)) = self.tx_type {
            write!(f, "tx_type {requested:?} requested, got {granted:?}")?;
            separator = ", ";
        }

        if let Some((requested, granted)) = self.rx_filter {
            write!(
                f,
                "{separator}rx_filter {requested:?} requested, got {granted:?}"
            )?;
        }

        Ok(())
    }
}
