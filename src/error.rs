use crate::wg::KeyParseError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot get keys for device {device}: {source}")]
    KeyRetrieval { device: String, source: BoxError },

    #[error("cannot set up key for device {device}: {source}")]
    KeyGeneration { device: String, source: BoxError },

    #[error("lease request to {url} failed: {source}")]
    LeaseProtocol { url: String, source: BoxError },

    #[error("lease request to {url} rejected: {status}")]
    LeaseRejected {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("cannot parse ip net {input:?}: {source}")]
    Parse {
        input: String,
        source: ipnetwork::IpNetworkError,
    },

    #[error("{op} on device {device} failed: {source}")]
    LinkState {
        device: String,
        op: &'static str,
        source: BoxError,
    },

    #[error("cannot start wg device {device}: {source}")]
    DeviceStart { device: String, source: BoxError },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("wg cmd fail: {0:?}")]
    WgCommandFail(Option<i32>),

    #[error("key parse error: {0}")]
    KeyParseError(#[from] KeyParseError),
}

impl Error {
    pub(crate) fn link_state(
        device: &str,
        op: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::LinkState {
            device: device.to_string(),
            op,
            source: source.into(),
        }
    }
}
