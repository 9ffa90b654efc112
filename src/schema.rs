use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Remote order status meaning "ticket issued" in the order-wait flow.
pub const ORDER_STATUS_TICKETED: i64 = 9;

/// The captcha-check endpoint reports success as a one-character string,
/// unlike the other endpoints which use integer result codes.
pub const CAPTCHA_CHECK_PASSED: &str = "4";

/// Integer result code shared by the login and logout replies.
pub const RESULT_CODE_OK: i64 = 0;

/// One entry of the station directory, keyed by `name` after parsing.
#[derive(Deserialize, Clone, Debug)]
pub struct Station {
    pub name: String,
    pub code: String,
    pub pinyin: String,
    pub simple_pinyin: String,
}

/// A registered passenger with every field the order flow needs. Records
/// coming off the wire with any of these missing are dropped up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Passenger {
    pub name: String,
    pub id_type: String,
    pub id_number: String,
    pub phone: String,
}

/// Passenger record as the site spells it.
#[derive(Deserialize, Default, Debug)]
pub struct RawPassenger {
    #[serde(default)]
    pub passenger_name: String,
    #[serde(default)]
    pub passenger_id_type_code: String,
    #[serde(default)]
    pub passenger_id_no: String,
    #[serde(default)]
    pub mobile_no: String,
}

impl RawPassenger {
    /// `None` when any required field is missing or empty.
    pub fn into_complete(self) -> Option<Passenger> {
        if self.passenger_name.is_empty()
            || self.passenger_id_type_code.is_empty()
            || self.passenger_id_no.is_empty()
            || self.mobile_no.is_empty()
        {
            return None;
        }
        Some(Passenger {
            name: self.passenger_name,
            id_type: self.passenger_id_type_code,
            id_number: self.passenger_id_no,
            phone: self.mobile_no,
        })
    }
}

/// One row of the left-ticket query result. Only the fields the order flow
/// reads are typed; everything else rides along verbatim in `extra`.
#[derive(Deserialize, Clone, Debug)]
pub struct TrainOption {
    pub date: String,
    pub train_no: String,
    pub station_train_code: String,
    pub seat_type: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Normalized outcome of the confirm-submit call.
#[derive(Clone, Debug, Default)]
pub struct SubmitOutcome {
    pub status: bool,
    pub messages: Vec<String>,
    pub order_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CaptchaCheckReply {
    pub result_code: Option<String>,
    pub result_message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginReply {
    pub result_code: Option<i64>,
    pub result_message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TicketQueryReply {
    #[serde(default)]
    pub status: bool,
    pub data: Option<TicketQueryData>,
}

#[derive(Deserialize, Debug)]
pub struct TicketQueryData {
    #[serde(default)]
    pub result: Vec<TrainOption>,
}

#[derive(Deserialize, Debug)]
pub struct PassengerReply {
    pub data: Option<PassengerData>,
}

#[derive(Deserialize, Debug)]
pub struct PassengerData {
    #[serde(default)]
    pub normal_passengers: Vec<RawPassenger>,
}

#[derive(Deserialize, Debug)]
pub struct InitOrderReply {
    pub data: Option<InitOrderData>,
}

#[derive(Deserialize, Debug)]
pub struct InitOrderData {
    #[serde(rename = "submitToken")]
    pub submit_token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SubmitReply {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub messages: Vec<String>,
    pub data: Option<SubmitData>,
}

#[derive(Deserialize, Debug)]
pub struct SubmitData {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct OrderWaitReply {
    pub data: Option<OrderWaitData>,
}

#[derive(Deserialize, Debug)]
pub struct OrderWaitData {
    #[serde(rename = "orderStatus")]
    pub order_status: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct LogoutReply {
    pub result_code: Option<i64>,
    pub result_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_check_code_is_a_string_while_login_code_is_an_integer() {
        let check: CaptchaCheckReply =
            serde_json::from_str(r#"{"result_code":"4","result_message":"ok"}"#).unwrap();
        assert_eq!(check.result_code.as_deref(), Some(CAPTCHA_CHECK_PASSED));

        let login: LoginReply =
            serde_json::from_str(r#"{"result_code":0,"result_message":"ok"}"#).unwrap();
        assert_eq!(login.result_code, Some(RESULT_CODE_OK));
    }

    #[test]
    fn train_option_keeps_unknown_fields() {
        let train: TrainOption = serde_json::from_str(
            r#"{
                "date": "2099-01-01",
                "train_no": "240000G1010I",
                "station_train_code": "G101",
                "seat_type": "O",
                "start_time": "06:44",
                "left_count": 99
            }"#,
        )
        .unwrap();
        assert_eq!(train.station_train_code, "G101");
        assert_eq!(train.extra["start_time"], "06:44");
        assert_eq!(train.extra["left_count"], 99);
    }

    #[test]
    fn incomplete_passenger_is_rejected() {
        let missing_phone = RawPassenger {
            passenger_name: "张三".into(),
            passenger_id_type_code: "1".into(),
            passenger_id_no: "110101199001011234".into(),
            mobile_no: String::new(),
        };
        assert!(missing_phone.into_complete().is_none());

        let complete = RawPassenger {
            passenger_name: "张三".into(),
            passenger_id_type_code: "1".into(),
            passenger_id_no: "110101199001011234".into(),
            mobile_no: "13800138000".into(),
        };
        let passenger = complete.into_complete().unwrap();
        assert_eq!(passenger.name, "张三");
        assert_eq!(passenger.phone, "13800138000");
    }

    #[test]
    fn submit_reply_surfaces_order_id_and_messages() {
        let ok: SubmitReply = serde_json::from_str(
            r#"{"status":true,"messages":[],"data":{"orderId":"E123456789"}}"#,
        )
        .unwrap();
        assert!(ok.status);
        assert_eq!(ok.data.unwrap().order_id.as_deref(), Some("E123456789"));

        let rejected: SubmitReply =
            serde_json::from_str(r#"{"status":false,"messages":["余票不足"]}"#).unwrap();
        assert!(!rejected.status);
        assert_eq!(rejected.messages, vec!["余票不足"]);
    }

    #[test]
    fn order_wait_reply_exposes_the_status_code() {
        let reply: OrderWaitReply =
            serde_json::from_str(r#"{"data":{"orderStatus":9,"waitTime":-1}}"#).unwrap();
        assert_eq!(
            reply.data.unwrap().order_status,
            Some(ORDER_STATUS_TICKETED)
        );

        let empty: OrderWaitReply = serde_json::from_str(r#"{"data":{}}"#).unwrap();
        assert_eq!(empty.data.unwrap().order_status, None);
    }
}
