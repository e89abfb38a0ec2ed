//! Measurement record schema.
//!
//! [`Measurement`] is the persisted shape returned to uploaders; the nested
//! [`ClientInfo`], [`ServerInfo`] and [`Results`] blocks are stored as JSON
//! sub-documents rather than normalized into their own tables.
//!
//! Inbound bodies are decoded into [`MeasurementPayload`] first. The payload
//! keeps the required fields as raw JSON so that [`crate::validate`] can tell
//! an absent field from a wrongly typed one, and both from an explicit zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One uploaded network-performance test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Assigned by the store on insert; `0` until then.
    #[serde(default)]
    pub id: i64,

    /// Receive time, stamped by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Identifier of the external test run. Unique when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(rename = "browserID")]
    pub browser_id: String,

    #[serde(default)]
    pub device_type: String,

    #[serde(default)]
    pub notes: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,

    pub download: f64,
    pub upload: f64,
    pub latency: i64,

    #[serde(default)]
    pub results: Results,
}

/// Where the uploading client ran the test from.
///
/// Kept as an opaque JSON object: uploaders put `city`, `countryCode`, `asn`
/// and whatever else they know here, and every key is stored and returned
/// as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientInfo(pub Map<String, Value>);

/// The measurement server the test ran against. Opaque like [`ClientInfo`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerInfo(pub Map<String, Value>);

macro_rules! json_object_block {
    ($name:ident) => {
        impl $name {
            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }
        }

        impl From<Map<String, Value>> for $name {
            fn from(map: Map<String, Value>) -> Self {
                Self(map)
            }
        }

        impl FromIterator<(String, Value)> for $name {
            fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

json_object_block!(ClientInfo);
json_object_block!(ServerInfo);

/// NDT variables reported by the measurement server at the end of a test.
///
/// Field names on the wire follow the NDT client verbatim. Values are kept
/// as the client sent them; nothing here is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Results {
    #[serde(rename = "AckPktsIn")]
    pub ack_pkts_in: String,
    #[serde(rename = "ClientToServerSpeed")]
    pub client_to_server_speed: f64,
    #[serde(rename = "CongestionSignals")]
    pub congestion_signals: String,
    #[serde(rename = "CountRTT")]
    pub count_rtt: String,
    #[serde(rename = "CurMSS")]
    pub cur_mss: String,
    #[serde(rename = "CurRTO")]
    pub cur_rto: String,
    #[serde(rename = "DataBytesOut")]
    pub data_bytes_out: String,
    #[serde(rename = "DupAcksIn")]
    pub dup_acks_in: String,
    #[serde(rename = "Jitter")]
    pub jitter: f64,
    #[serde(rename = "MaxCwnd")]
    pub max_cwnd: String,
    #[serde(rename = "MaxRTT")]
    pub max_rtt: String,
    #[serde(rename = "MaxRwinRcvd")]
    pub max_rwin_rcvd: String,
    #[serde(rename = "MinRTT")]
    pub min_rtt: String,

    #[serde(rename = "NDTResult.S2C.ClientIP")]
    pub s2c_client_ip: String,
    #[serde(rename = "NDTResult.S2C.ClientPort")]
    pub s2c_client_port: String,
    #[serde(rename = "NDTResult.S2C.EndTime")]
    pub s2c_end_time: String,
    #[serde(rename = "NDTResult.S2C.Error")]
    pub s2c_error: String,
    #[serde(rename = "NDTResult.S2C.MinRTT")]
    pub s2c_min_rtt: String,
    #[serde(rename = "NDTResult.S2C.ServerIP")]
    pub s2c_server_ip: String,
    #[serde(rename = "NDTResult.S2C.ServerPort")]
    pub s2c_server_port: String,
    #[serde(rename = "NDTResult.S2C.StartTime")]
    pub s2c_start_time: String,
    #[serde(rename = "NDTResult.S2C.UUID")]
    pub s2c_uuid: String,

    #[serde(rename = "PktsOut")]
    pub pkts_out: String,
    #[serde(rename = "PktsRetrans")]
    pub pkts_retrans: String,
    #[serde(rename = "RcvWinScale")]
    pub rcv_win_scale: String,
    #[serde(rename = "ServerToClientSpeed")]
    pub server_to_client_speed: f64,
    #[serde(rename = "SndLimTimeCwnd")]
    pub snd_lim_time_cwnd: String,
    #[serde(rename = "SndLimTimeRwin")]
    pub snd_lim_time_rwin: String,
    #[serde(rename = "SndLimTimeSender")]
    pub snd_lim_time_sender: String,
    #[serde(rename = "SndWinScale")]
    pub snd_win_scale: String,
    #[serde(rename = "Sndbuf")]
    pub sndbuf: String,
    #[serde(rename = "SumRTT")]
    pub sum_rtt: String,

    #[serde(rename = "TCPInfo.ATO")]
    pub tcp_info_ato: String,
    #[serde(rename = "TCPInfo.AdvMSS")]
    pub tcp_info_adv_mss: String,
    #[serde(rename = "TCPInfo.AppLimited")]
    pub tcp_info_app_limited: String,
    #[serde(rename = "TCPInfo.Backoff")]
    pub tcp_info_backoff: String,
    #[serde(rename = "TCPInfo.BusyTime")]
    pub tcp_info_busy_time: String,
    #[serde(rename = "TCPInfo.BytesAcked")]
    pub tcp_info_bytes_acked: String,
    #[serde(rename = "TCPInfo.BytesReceived")]
    pub tcp_info_bytes_received: String,
    #[serde(rename = "TCPInfo.BytesRetrans")]
    pub tcp_info_bytes_retrans: String,
    #[serde(rename = "TCPInfo.BytesSent")]
    pub tcp_info_bytes_sent: String,
    #[serde(rename = "TCPInfo.CAState")]
    pub tcp_info_ca_state: String,
    #[serde(rename = "TCPInfo.DSackDups")]
    pub tcp_info_dsack_dups: String,
    #[serde(rename = "TCPInfo.DataSegsIn")]
    pub tcp_info_data_segs_in: String,
    #[serde(rename = "TCPInfo.DataSegsOut")]
    pub tcp_info_data_segs_out: String,
    #[serde(rename = "TCPInfo.Delivered")]
    pub tcp_info_delivered: String,
    #[serde(rename = "TCPInfo.DeliveredCE")]
    pub tcp_info_delivered_ce: String,
    #[serde(rename = "TCPInfo.DeliveryRate")]
    pub tcp_info_delivery_rate: String,
    #[serde(rename = "TCPInfo.Fackets")]
    pub tcp_info_fackets: String,
    #[serde(rename = "TCPInfo.LastAckRecv")]
    pub tcp_info_last_ack_recv: String,
    #[serde(rename = "TCPInfo.LastAckSent")]
    pub tcp_info_last_ack_sent: String,
    #[serde(rename = "TCPInfo.LastDataRecv")]
    pub tcp_info_last_data_recv: String,
    #[serde(rename = "TCPInfo.LastDataSent")]
    pub tcp_info_last_data_sent: String,
    #[serde(rename = "TCPInfo.Lost")]
    pub tcp_info_lost: String,
    #[serde(rename = "TCPInfo.MaxPacingRate")]
    pub tcp_info_max_pacing_rate: String,
    #[serde(rename = "TCPInfo.MinRTT")]
    pub tcp_info_min_rtt: String,
    #[serde(rename = "TCPInfo.NotsentBytes")]
    pub tcp_info_notsent_bytes: String,
    #[serde(rename = "TCPInfo.Options")]
    pub tcp_info_options: String,
    #[serde(rename = "TCPInfo.PMTU")]
    pub tcp_info_pmtu: String,
    #[serde(rename = "TCPInfo.PacingRate")]
    pub tcp_info_pacing_rate: String,
    #[serde(rename = "TCPInfo.Probes")]
    pub tcp_info_probes: String,
    #[serde(rename = "TCPInfo.RTO")]
    pub tcp_info_rto: String,
    #[serde(rename = "TCPInfo.RTT")]
    pub tcp_info_rtt: String,
    #[serde(rename = "TCPInfo.RTTVar")]
    pub tcp_info_rtt_var: String,
    #[serde(rename = "TCPInfo.RWndLimited")]
    pub tcp_info_rwnd_limited: String,
    #[serde(rename = "TCPInfo.RcvMSS")]
    pub tcp_info_rcv_mss: String,
    #[serde(rename = "TCPInfo.RcvRTT")]
    pub tcp_info_rcv_rtt: String,
    #[serde(rename = "TCPInfo.RcvSpace")]
    pub tcp_info_rcv_space: String,
    #[serde(rename = "TCPInfo.RcvSsThresh")]
    pub tcp_info_rcv_ss_thresh: String,
    #[serde(rename = "TCPInfo.ReordSeen")]
    pub tcp_info_reord_seen: String,
    #[serde(rename = "TCPInfo.Reordering")]
    pub tcp_info_reordering: String,
    #[serde(rename = "TCPInfo.Retrans")]
    pub tcp_info_retrans: String,
    #[serde(rename = "TCPInfo.Retransmits")]
    pub tcp_info_retransmits: String,
    #[serde(rename = "TCPInfo.Sacked")]
    pub tcp_info_sacked: String,
    #[serde(rename = "TCPInfo.SegsIn")]
    pub tcp_info_segs_in: String,
    #[serde(rename = "TCPInfo.SegsOut")]
    pub tcp_info_segs_out: String,
    #[serde(rename = "TCPInfo.SndBufLimited")]
    pub tcp_info_snd_buf_limited: String,
    #[serde(rename = "TCPInfo.SndCwnd")]
    pub tcp_info_snd_cwnd: String,
    #[serde(rename = "TCPInfo.SndMSS")]
    pub tcp_info_snd_mss: String,
    #[serde(rename = "TCPInfo.SndSsThresh")]
    pub tcp_info_snd_ss_thresh: String,
    #[serde(rename = "TCPInfo.State")]
    pub tcp_info_state: String,
    #[serde(rename = "TCPInfo.TotalRetrans")]
    pub tcp_info_total_retrans: String,
    #[serde(rename = "TCPInfo.Unacked")]
    pub tcp_info_unacked: String,
    #[serde(rename = "TCPInfo.WScale")]
    pub tcp_info_wscale: String,

    #[serde(rename = "Timeouts")]
    pub timeouts: String,
}

/// Error returned when an inbound body cannot be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed measurement body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed measurement body: expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Wire shape of an inbound upload.
///
/// Required fields stay as raw JSON values until validation. Optional fields
/// are typed, so a wrongly typed optional field is a [`DecodeError`].
/// `id` and `timestamp` are not read from the wire at all.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementPayload {
    #[serde(default, rename = "browserID", alias = "BrowserID")]
    pub browser_id: Option<Value>,

    #[serde(default, alias = "Download")]
    pub download: Option<Value>,

    #[serde(default, alias = "Upload")]
    pub upload: Option<Value>,

    #[serde(default, alias = "Latency")]
    pub latency: Option<Value>,

    #[serde(default, alias = "UUID")]
    pub uuid: Option<String>,

    #[serde(default, alias = "DeviceType")]
    pub device_type: Option<String>,

    #[serde(default, alias = "Notes")]
    pub notes: Option<String>,

    #[serde(default, alias = "ClientInfo")]
    pub client_info: Option<ClientInfo>,

    #[serde(default, alias = "ServerInfo")]
    pub server_info: Option<ServerInfo>,

    #[serde(default, alias = "Results")]
    pub results: Option<Results>,
}

impl MeasurementPayload {
    /// Decode a JSON request body. Unknown fields are ignored.
    ///
    /// The body must be a JSON object; arrays and scalars are rejected rather
    /// than mapped onto fields by position.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
