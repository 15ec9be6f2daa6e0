use serde::Deserialize;

/// Timestamp signals requested from a socket.
///
/// Every flag is independent. Once applied, any receive may carry any subset
/// of the requested signals, so consumers must not assume all of them arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SocketTimestampOptions {
    /// Generate timestamps in the adapter when packets arrive
    #[serde(default = "enabled")]
    pub rx_hardware: bool,
    /// Generate timestamps when packets enter the kernel
    #[serde(default = "enabled")]
    pub rx_software: bool,
    /// Generate timestamps in the adapter when packets leave
    #[serde(default = "enabled")]
    pub tx_hardware: bool,
    /// Generate timestamps when the driver hands packets to the adapter
    #[serde(default = "enabled")]
    pub tx_software: bool,
    /// Generate timestamps before packets enter the packet scheduler
    #[serde(default = "enabled")]
    pub tx_scheduled: bool,
    /// Generate timestamps when all data has been acknowledged (tcp only)
    #[serde(default = "enabled")]
    pub tx_acknowledged: bool,
    /// Report software timestamps
    #[serde(default = "enabled")]
    pub report_software: bool,
    /// Report hardware timestamps in the adapter's own clock
    #[serde(default = "enabled")]
    pub report_raw_hardware: bool,
    /// Tag send timestamps with a per-socket counter
    #[serde(default = "enabled")]
    pub opt_id: bool,
    /// Do not echo the sent payload back on the error queue
    #[serde(default = "enabled")]
    pub opt_tsonly: bool,
    /// Deliver software and hardware send timestamps as separate reports
    #[serde(default = "enabled")]
    pub opt_tx_swhw: bool,
}

fn enabled() -> bool {
    true
}

impl Default for SocketTimestampOptions {
    fn default() -> Self {
        Self::ALL
    }
}

impl SocketTimestampOptions {
    pub const ALL: Self = Self {
        rx_hardware: true,
        rx_software: true,
        tx_hardware: true,
        tx_software: true,
        tx_scheduled: true,
        tx_acknowledged: true,
        report_software: true,
        report_raw_hardware: true,
        opt_id: true,
        opt_tsonly: true,
        opt_tx_swhw: true,
    };

    pub const NONE: Self = Self {
        rx_hardware: false,
        rx_software: false,
        tx_hardware: false,
        tx_software: false,
        tx_scheduled: false,
        tx_acknowledged: false,
        report_software: false,
        report_raw_hardware: false,
        opt_id: false,
        opt_tsonly: false,
        opt_tx_swhw: false,
    };

    /// Software-only receive and send timestamps, tagged with an id.
    pub const SOFTWARE: Self = Self {
        rx_software: true,
        tx_software: true,
        report_software: true,
        opt_id: true,
        opt_tsonly: true,
        ..Self::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether any send-side timestamps were requested
    pub fn wants_send_timestamps(&self) -> bool {
        self.tx_hardware || self.tx_software || self.tx_scheduled || self.tx_acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let options: SocketTimestampOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SocketTimestampOptions::ALL);
        assert_eq!(SocketTimestampOptions::default(), SocketTimestampOptions::ALL);
    }

    #[test]
    fn individual_flags() {
        let options: SocketTimestampOptions =
            serde_json::from_str(r#"{"opt-tx-swhw": false, "tx-acknowledged": false}"#).unwrap();

        assert!(!options.opt_tx_swhw);
        assert!(!options.tx_acknowledged);
        assert!(options.rx_hardware);
        assert!(options.wants_send_timestamps());
    }

    #[test]
    fn unknown_flag_rejected() {
        assert!(serde_json::from_str::<SocketTimestampOptions>(r#"{"rx-magic": true}"#).is_err());
    }

    #[test]
    fn empty() {
        assert!(SocketTimestampOptions::NONE.is_empty());
        assert!(!SocketTimestampOptions::SOFTWARE.is_empty());
        assert!(!SocketTimestampOptions::NONE.wants_send_timestamps());
    }
}
