/**
 * Error Conversion
 *
 * Maps transport-level failures onto `RealtimeError`. Connection failures
 * raised while establishing the first connection become `ConnectError`
 * at the call site (`ChannelSubscriber::start`); everything else a
 * transport reports mid-session is transient.
 */

use crate::backend::error::types::RealtimeError;
use crate::backend::realtime::transport::TransportError;

impl From<TransportError> for RealtimeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(message) => RealtimeError::connect(message),
            other => RealtimeError::transient(other.to_string()),
        }
    }
}
