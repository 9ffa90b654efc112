pub mod cli;
pub mod schema;

use bytes::Bytes;
use chrono::{Local, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use std::collections::HashMap;
use std::io;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::cli::Args;
use crate::schema::{
    CAPTCHA_CHECK_PASSED, CaptchaCheckReply, InitOrderReply, LoginReply, LogoutReply,
    ORDER_STATUS_TICKETED, OrderWaitReply, Passenger, PassengerReply, RESULT_CODE_OK, RawPassenger,
    Station, SubmitOutcome, SubmitReply, TicketQueryReply, TrainOption,
};

pub use crate::captcha::{CaptchaResolver, ConsoleCaptcha};

static INDEX_URL: &str = "https://www.12306.cn/index/";
static CAPTCHA_IMAGE_URL: &str =
    "https://kyfw.12306.cn/passport/captcha/captcha-image?login_site=E&module=login&rand=sjrand";
static CAPTCHA_CHECK_URL: &str = "https://kyfw.12306.cn/passport/captcha/captcha-check";
static LOGIN_URL: &str = "https://kyfw.12306.cn/passport/web/login";
static STATION_NAMES_URL: &str =
    "https://kyfw.12306.cn/otn/resources/js/framework/station_name.js?station_version=1.9076";
static LEFT_TICKET_URL: &str = "https://kyfw.12306.cn/otn/leftTicket/query";
static PASSENGER_LIST_URL: &str = "https://kyfw.12306.cn/otn/confirmPassenger/getPassengerDTOs";
static INIT_ORDER_URL: &str = "https://kyfw.12306.cn/otn/confirmPassenger/initDc";
static SUBMIT_ORDER_URL: &str =
    "https://kyfw.12306.cn/otn/confirmPassenger/confirmSingleForQueue";
static ORDER_WAIT_URL: &str = "https://kyfw.12306.cn/otn/confirmPassenger/queryOrderWaitTime";
static LOGOUT_URL: &str = "https://kyfw.12306.cn/passport/web/logout";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Attempt cap for the order-status poll loop.
pub const MAX_STATUS_POLLS: u32 = 30;

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
        ),
    );
    headers.insert(
        "Referer",
        HeaderValue::from_static("https://kyfw.12306.cn/otn/resources/login.html"),
    );
    headers
}

fn get_input<T: FromStr>(hint: &str, default: T) -> T {
    println!("{hint}");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).unwrap_or_default();
    let input = input.trim().to_string();
    if input.is_empty() {
        return default;
    }
    input.parse().unwrap_or(default)
}

/// Read one trimmed line from stdin after printing the hint. Unlike
/// [`get_input`] this surfaces I/O errors, for the pre-session prompts
/// where a dead stdin must abort the program.
pub fn prompt_line(hint: &str) -> io::Result<String> {
    println!("{hint}");
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("could not decode reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not encode form payload: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("captcha input failed: {0}")]
    Captcha(#[from] io::Error),
    #[error("the session is already closed")]
    Closed,
}

// Resolving a challenge image into the site's coordinate answer.
pub mod captcha {
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::process::Command;

    use tracing::warn;

    /// One method: challenge image bytes in, coordinate answer out.
    ///
    /// The console adapter below blocks on a human; a non-interactive
    /// deployment can plug in its own adapter without touching the
    /// session logic.
    pub trait CaptchaResolver {
        fn resolve(&self, image: &[u8]) -> io::Result<String>;
    }

    impl<F> CaptchaResolver for F
    where
        F: Fn(&[u8]) -> io::Result<String>,
    {
        fn resolve(&self, image: &[u8]) -> io::Result<String> {
            self(image)
        }
    }

    /// Shows the captcha in the platform image viewer and reads the
    /// coordinates (an `x,y,w,h`-style string) from stdin.
    pub struct ConsoleCaptcha;

    impl CaptchaResolver for ConsoleCaptcha {
        fn resolve(&self, image: &[u8]) -> io::Result<String> {
            let path = std::env::temp_dir().join("captcha.jpg");
            resolve_at(image, &path, prompt_coordinates)
        }
    }

    // The image only lives for the duration of the prompt; it is removed
    // before the answer is checked against the site.
    fn resolve_at(
        image: &[u8],
        path: &Path,
        prompt: impl FnOnce(&Path) -> io::Result<String>,
    ) -> io::Result<String> {
        fs::write(path, image)?;
        let answer = prompt(path);
        if let Err(err) = fs::remove_file(path) {
            warn!("could not remove the captcha image {}: {err}", path.display());
        }
        answer
    }

    fn prompt_coordinates(path: &Path) -> io::Result<String> {
        open_viewer(path);
        println!("Captcha image saved to {}", path.display());
        println!("Enter the captcha coordinates (e.g. 35,45,100,100):");
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn open_viewer(path: &Path) {
        let spawned = if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", &path.display().to_string()])
                .spawn()
        } else if cfg!(target_os = "macos") {
            Command::new("open").arg(path).spawn()
        } else {
            Command::new("xdg-open").arg(path).spawn()
        };
        if let Err(err) = spawned {
            warn!("could not open the captcha image automatically: {err}");
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn captcha_image_is_removed_after_the_prompt() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("captcha.jpg");

            let answer = resolve_at(b"not-really-a-jpeg", &path, |at| {
                assert!(at.exists(), "image must exist while the prompt runs");
                Ok("35,45,100,100".to_string())
            })
            .unwrap();

            assert_eq!(answer, "35,45,100,100");
            assert!(!path.exists(), "image must be gone after the prompt");
        }

        #[test]
        fn captcha_image_is_removed_even_when_the_prompt_fails() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("captcha.jpg");

            let result = resolve_at(b"not-really-a-jpeg", &path, |_| {
                Err(io::Error::other("stdin went away"))
            });

            assert!(result.is_err());
            assert!(!path.exists());
        }
    }
}

#[derive(Serialize, Debug)]
struct CaptchaCheckPayload<'a> {
    answer: &'a str,
    login_site: &'a str,
    rand: &'a str,
}

#[derive(Serialize, Debug)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
    appid: &'a str,
}

#[derive(Serialize, Debug)]
struct InitOrderPayload<'a> {
    train_date: &'a str,
    train_no: &'a str,
    #[serde(rename(serialize = "stationTrainCode"))]
    station_train_code: &'a str,
}

#[derive(Serialize, Debug)]
struct SubmitOrderPayload<'a> {
    #[serde(rename(serialize = "passengerTicketStr"))]
    passenger_ticket_str: String,
    #[serde(rename(serialize = "oldPassengerStr"))]
    old_passenger_str: String,
    #[serde(rename(serialize = "REPEAT_SUBMIT_TOKEN"))]
    repeat_submit_token: &'a str,
}

/// Accepts `YYYY-MM-DD` dates that are today or later.
pub fn validate_travel_date(date: &str) -> bool {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => parsed >= Local::now().date_naive(),
        Err(_) => false,
    }
}

/// Parses the `station_name.js` resource, a `var … = <json array>;`
/// assignment, into a name-keyed station map.
pub fn parse_station_table(js: &str) -> Result<HashMap<String, Station>, SessionError> {
    let (_, payload) = js
        .split_once('=')
        .ok_or_else(|| SessionError::Malformed("station table is not a JS assignment".into()))?;
    let payload = payload.trim().trim_end_matches(';');
    let stations: Vec<Station> = serde_json::from_str(payload)?;
    Ok(stations
        .into_iter()
        .map(|station| (station.name.clone(), station))
        .collect())
}

fn filter_passengers(raw: Vec<RawPassenger>) -> Vec<Passenger> {
    raw.into_iter()
        .filter_map(|record| {
            let name = record.passenger_name.clone();
            match record.into_complete() {
                Some(passenger) => Some(passenger),
                None => {
                    warn!("dropping incomplete passenger record for {name:?}");
                    None
                }
            }
        })
        .collect()
}

// Field order and separators in the two passenger strings are a
// compatibility contract with the site; change nothing here.
pub fn passenger_ticket_str(passenger: &Passenger, train: &TrainOption) -> String {
    format!(
        "{},1,{},{},1,{},",
        passenger.name, passenger.id_type, passenger.id_number, train.seat_type
    )
}

pub fn old_passenger_str(passenger: &Passenger) -> String {
    format!(
        "{},{},{},1_",
        passenger.name, passenger.id_type, passenger.id_number
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ticketed { attempts: u32 },
    TimedOut,
}

/// Polls `check` at a fixed interval until it yields the "ticketed" status
/// code or [`MAX_STATUS_POLLS`] attempts have been spent. The status source
/// is injected so the loop can be driven without a network.
pub fn poll_until_ticketed<F>(mut check: F, interval: Duration) -> PollOutcome
where
    F: FnMut(u32) -> Option<i64>,
{
    for attempt in 1..=MAX_STATUS_POLLS {
        if check(attempt) == Some(ORDER_STATUS_TICKETED) {
            return PollOutcome::Ticketed { attempts: attempt };
        }
        if attempt < MAX_STATUS_POLLS {
            thread::sleep(interval);
        }
    }
    PollOutcome::TimedOut
}

/// One authenticated walk through the booking flow: cookies, login,
/// station directory, ticket query, order submission, status polling.
///
/// Every operation maps transport and remote failures to a failure value
/// (`false`, an empty list, `None`, a failed outcome) after logging them;
/// nothing here panics on a bad reply.
pub struct BookingSession {
    client: Option<Client>,
    captcha: Box<dyn CaptchaResolver>,
    stations: HashMap<String, Station>,
}

impl BookingSession {
    pub fn new(captcha: Box<dyn CaptchaResolver>) -> Result<Self, SessionError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(20))
            .default_headers(default_headers())
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(BookingSession {
            client: Some(client),
            captcha,
            stations: HashMap::new(),
        })
    }

    #[cfg(test)]
    fn detached() -> Self {
        fn never(_: &[u8]) -> io::Result<String> {
            Err(io::Error::other("no captcha in tests"))
        }
        BookingSession {
            client: None,
            captcha: Box::new(never),
            stations: HashMap::new(),
        }
    }

    fn client(&self) -> Result<&Client, SessionError> {
        self.client.as_ref().ok_or(SessionError::Closed)
    }

    /// Warm-up request for baseline cookies. Non-fatal: the flow keeps
    /// going even when it fails.
    pub fn init_session(&self) -> bool {
        match self.try_init_session() {
            Ok(()) => {
                info!("session warm-up complete");
                true
            }
            Err(err) => {
                error!("session warm-up failed: {err}");
                false
            }
        }
    }

    fn try_init_session(&self) -> Result<(), SessionError> {
        self.client()?.get(INDEX_URL).send()?;
        Ok(())
    }

    /// Captcha round-trip followed by the credential submission. `false`
    /// when either step is rejected or a request fails.
    pub fn login(&self, username: &str, password: &str) -> bool {
        match self.try_login(username, password) {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("login failed: {err}");
                false
            }
        }
    }

    fn try_login(&self, username: &str, password: &str) -> Result<bool, SessionError> {
        let client = self.client()?;

        let image: Bytes = client.get(CAPTCHA_IMAGE_URL).send()?.bytes()?;
        let answer = self.captcha.resolve(&image)?;

        let check = CaptchaCheckPayload {
            answer: &answer,
            login_site: "E",
            rand: "sjrand",
        };
        let reply: CaptchaCheckReply = client
            .post(CAPTCHA_CHECK_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(serde_urlencoded::to_string(&check)?)
            .send()?
            .json()?;
        if reply.result_code.as_deref() != Some(CAPTCHA_CHECK_PASSED) {
            warn!(
                "captcha verification rejected: {}",
                reply.result_message.as_deref().unwrap_or("no message")
            );
            return Ok(false);
        }

        let reply: LoginReply = client
            .post(LOGIN_URL)
            .json(&LoginPayload {
                username,
                password,
                appid: "otn",
            })
            .send()?
            .json()?;
        if reply.result_code == Some(RESULT_CODE_OK) {
            info!("logged in as {username}");
            Ok(true)
        } else {
            warn!(
                "login rejected: {}",
                reply.result_message.as_deref().unwrap_or("no message")
            );
            Ok(false)
        }
    }

    /// Downloads and parses the station directory.
    pub fn fetch_stations(&mut self) -> bool {
        match self.try_fetch_stations() {
            Ok(stations) => {
                info!("loaded {} stations", stations.len());
                self.stations = stations;
                true
            }
            Err(err) => {
                error!("could not load the station directory: {err}");
                false
            }
        }
    }

    fn try_fetch_stations(&self) -> Result<HashMap<String, Station>, SessionError> {
        let body = self.client()?.get(STATION_NAMES_URL).send()?.text()?;
        parse_station_table(&body)
    }

    pub fn stations(&self) -> &HashMap<String, Station> {
        &self.stations
    }

    /// Exact-name lookup into the loaded directory.
    pub fn station_code(&self, name: &str) -> Option<&str> {
        match self.stations.get(name) {
            Some(station) => Some(station.code.as_str()),
            None => {
                warn!("no station code found for {name:?}");
                None
            }
        }
    }

    /// Left-ticket query. Local validation runs first: a malformed or past
    /// date, or an unknown station name, returns an empty list without
    /// touching the network.
    pub fn query_tickets(&self, date: &str, from: &str, to: &str) -> Vec<TrainOption> {
        if !validate_travel_date(date) {
            error!("invalid or past travel date: {date:?}");
            return Vec::new();
        }
        let Some(from_code) = self.station_code(from) else {
            return Vec::new();
        };
        let Some(to_code) = self.station_code(to) else {
            return Vec::new();
        };

        match self.try_query_tickets(date, from_code, to_code) {
            Ok(trains) => {
                info!("found {} train(s) for {from} -> {to} on {date}", trains.len());
                trains
            }
            Err(err) => {
                error!("ticket query failed: {err}");
                Vec::new()
            }
        }
    }

    fn try_query_tickets(
        &self,
        date: &str,
        from_code: &str,
        to_code: &str,
    ) -> Result<Vec<TrainOption>, SessionError> {
        let reply: TicketQueryReply = self
            .client()?
            .get(LEFT_TICKET_URL)
            .query(&[
                ("leftTicketDTO.train_date", date),
                ("leftTicketDTO.from_station", from_code),
                ("leftTicketDTO.to_station", to_code),
                ("purpose_codes", "ADULT"),
            ])
            .send()?
            .json()?;
        if !reply.status {
            warn!("the left-ticket query reported failure");
            return Ok(Vec::new());
        }
        Ok(reply.data.map(|data| data.result).unwrap_or_default())
    }

    /// Registered passengers of the logged-in account, incomplete records
    /// already dropped.
    pub fn fetch_passengers(&self) -> Vec<Passenger> {
        match self.try_fetch_passengers() {
            Ok(passengers) => {
                info!("loaded {} complete passenger profile(s)", passengers.len());
                passengers
            }
            Err(err) => {
                error!("could not load the passenger list: {err}");
                Vec::new()
            }
        }
    }

    fn try_fetch_passengers(&self) -> Result<Vec<Passenger>, SessionError> {
        let reply: PassengerReply = self.client()?.post(PASSENGER_LIST_URL).send()?.json()?;
        let raw = reply
            .data
            .map(|data| data.normal_passengers)
            .unwrap_or_default();
        Ok(filter_passengers(raw))
    }

    /// Submits the train selection and returns the one-time submission
    /// token that authorizes the confirm step.
    pub fn initialize_order(&self, train: &TrainOption) -> Option<String> {
        match self.try_initialize_order(train) {
            Ok(Some(token)) => {
                info!("order initialized");
                Some(token)
            }
            Ok(None) => {
                error!("order initialization carried no submission token");
                None
            }
            Err(err) => {
                error!("order initialization failed: {err}");
                None
            }
        }
    }

    fn try_initialize_order(&self, train: &TrainOption) -> Result<Option<String>, SessionError> {
        let payload = InitOrderPayload {
            train_date: &train.date,
            train_no: &train.train_no,
            station_train_code: &train.station_train_code,
        };
        let reply: InitOrderReply = self
            .client()?
            .post(INIT_ORDER_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(serde_urlencoded::to_string(&payload)?)
            .send()?
            .json()?;
        Ok(reply.data.and_then(|data| data.submit_token))
    }

    /// Confirm-submit with the token from [`Self::initialize_order`].
    /// Transport errors come back as a failed outcome carrying the error
    /// text, never as a crash.
    pub fn submit_order(
        &self,
        token: &str,
        train: &TrainOption,
        passenger: &Passenger,
    ) -> SubmitOutcome {
        match self.try_submit_order(token, train, passenger) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("order submission failed: {err}");
                SubmitOutcome {
                    status: false,
                    messages: vec![err.to_string()],
                    order_id: None,
                }
            }
        }
    }

    fn try_submit_order(
        &self,
        token: &str,
        train: &TrainOption,
        passenger: &Passenger,
    ) -> Result<SubmitOutcome, SessionError> {
        let payload = SubmitOrderPayload {
            passenger_ticket_str: passenger_ticket_str(passenger, train),
            old_passenger_str: old_passenger_str(passenger),
            repeat_submit_token: token,
        };
        let reply: SubmitReply = self
            .client()?
            .post(SUBMIT_ORDER_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(serde_urlencoded::to_string(&payload)?)
            .send()?
            .json()?;
        Ok(SubmitOutcome {
            status: reply.status,
            messages: reply.messages,
            order_id: reply.data.and_then(|data| data.order_id),
        })
    }

    /// Single status check; polling is the caller's business.
    pub fn query_order_status(&self, order_id: &str) -> Option<i64> {
        match self.try_query_order_status(order_id) {
            Ok(status) => status,
            Err(err) => {
                error!("order status check failed: {err}");
                None
            }
        }
    }

    fn try_query_order_status(&self, order_id: &str) -> Result<Option<i64>, SessionError> {
        let reply: OrderWaitReply = self
            .client()?
            .get(ORDER_WAIT_URL)
            .query(&[("orderId", order_id)])
            .send()?
            .json()?;
        Ok(reply.data.and_then(|data| data.order_status))
    }

    /// Polls the order status every two seconds until the ticket is issued
    /// or the attempt cap is spent.
    pub fn wait_for_ticket(&self, order_id: &str) -> PollOutcome {
        poll_until_ticketed(
            |attempt| {
                let status = self.query_order_status(order_id);
                info!("order status poll {attempt}/{MAX_STATUS_POLLS}: {status:?}");
                status
            },
            POLL_INTERVAL,
        )
    }

    /// Idempotent: posts the logout and drops the client on the first
    /// call, does nothing on later ones. Remote rejections are logged and
    /// swallowed so cleanup always completes.
    pub fn logout(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if let Err(err) = Self::try_logout(&client) {
            error!("logout request failed: {err}");
        }
        debug!("session closed");
    }

    fn try_logout(client: &Client) -> Result<(), SessionError> {
        let reply: LogoutReply = client.post(LOGOUT_URL).send()?.json()?;
        if reply.result_code == Some(RESULT_CODE_OK) {
            info!("account signed out");
        } else {
            warn!(
                "logout rejected: {}",
                reply.result_message.as_deref().unwrap_or("no message")
            );
        }
        Ok(())
    }
}

impl Drop for BookingSession {
    fn drop(&mut self) {
        self.logout();
    }
}

/// The interactive booking flow, start to finish. Every failure path
/// prints why and returns; the caller still owns the logout.
pub fn run(session: &mut BookingSession, args: &Args, username: &str, password: &str) {
    session.init_session();

    if !session.login(username, password) {
        println!("Login failed.");
        return;
    }

    if !session.fetch_stations() {
        println!("Could not load the station directory.");
        return;
    }

    let mut date_arg = args.date.clone();
    let mut from_arg = args.from.clone();
    let mut to_arg = args.to.clone();
    let mut seat_arg = args.seat_type.clone();

    let (tickets, seat_type) = loop {
        let from = from_arg
            .take()
            .unwrap_or_else(|| get_input("Departure station:", String::new()));
        let to = to_arg
            .take()
            .unwrap_or_else(|| get_input("Arrival station:", String::new()));
        let date = date_arg
            .take()
            .unwrap_or_else(|| get_input("Travel date (YYYY-MM-DD):", String::new()));
        let seat_type = seat_arg.take().unwrap_or_else(|| {
            get_input("Preferred seat type code (blank for any):", String::new())
        });

        if !validate_travel_date(&date) {
            println!("The date is malformed or already past, try again.");
            continue;
        }
        if session.station_code(&from).is_none() || session.station_code(&to).is_none() {
            println!("Unknown departure or arrival station, try again.");
            continue;
        }

        let tickets = session.query_tickets(&date, &from, &to);
        if tickets.is_empty() {
            println!("No trains found for this search.");
            let retry = get_input("Search again? (y/n, default: n):", "n".to_string());
            if retry.eq_ignore_ascii_case("y") {
                continue;
            }
            return;
        }
        break (tickets, seat_type);
    };

    for (idx, train) in tickets.iter().enumerate() {
        println!(
            "{:>2}. {:>6} on {} (seat type {})",
            idx, train.station_train_code, train.date, train.seat_type
        );
    }
    let train = if seat_type.is_empty() {
        &tickets[0]
    } else {
        tickets
            .iter()
            .find(|train| train.seat_type == seat_type)
            .unwrap_or_else(|| {
                println!("No train offers seat type {seat_type:?}, taking the first result.");
                &tickets[0]
            })
    };
    println!(
        "Selected train {} on {}.",
        train.station_train_code, train.date
    );

    let passengers = session.fetch_passengers();
    if passengers.is_empty() {
        println!("No complete passenger profiles on this account.");
        return;
    }
    for (idx, passenger) in passengers.iter().enumerate() {
        println!("{idx}: {} ({})", passenger.name, passenger.phone);
    }
    let index = get_input("Index of the passenger to book for (default: 0):", 0usize);
    let Some(passenger) = passengers.get(index) else {
        println!("Passenger index out of range.");
        return;
    };

    let Some(token) = session.initialize_order(train) else {
        println!("Order initialization failed.");
        return;
    };

    if args.test {
        println!("===== test mode =====");
        println!(
            "Would submit train {} on {} for {}",
            train.station_train_code, train.date, passenger.name
        );
        println!("passengerTicketStr: {}", passenger_ticket_str(passenger, train));
        println!("oldPassengerStr: {}", old_passenger_str(passenger));
        println!("Submission token: {token}");
        println!("===== end of test mode =====");
        return;
    }

    let outcome = session.submit_order(&token, train, passenger);
    if !outcome.status {
        println!("Order submission failed: {}", outcome.messages.join("; "));
        return;
    }
    println!("Order submitted.");

    let Some(order_id) = outcome.order_id else {
        println!("The submission reply carried no order id; check the order on the site.");
        return;
    };

    match session.wait_for_ticket(&order_id) {
        PollOutcome::Ticketed { attempts } => {
            println!("Ticket issued after {attempts} status check(s).");
        }
        PollOutcome::TimedOut => {
            println!(
                "No ticket confirmation after {MAX_STATUS_POLLS} status checks; \
                 check the order on the site."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_today_and_future_dates() {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert!(validate_travel_date(&today));
        assert!(validate_travel_date("2099-01-01"));
    }

    #[test]
    fn rejects_past_and_malformed_dates() {
        assert!(!validate_travel_date("2020-01-01"));
        assert!(!validate_travel_date("not-a-date"));
        assert!(!validate_travel_date("2099-13-01"));
        assert!(!validate_travel_date("2099/01/01"));
        assert!(!validate_travel_date(""));
    }

    const STATION_TABLE_JS: &str = r#"var station_names = [
        {"name":"北京","code":"BJP","pinyin":"beijing","simple_pinyin":"bj"},
        {"name":"上海","code":"SHH","pinyin":"shanghai","simple_pinyin":"sh"}
    ];"#;

    #[test]
    fn parses_the_station_table_fragment() {
        let stations = parse_station_table(STATION_TABLE_JS).unwrap();
        assert_eq!(stations.len(), 2);

        let beijing = &stations["北京"];
        assert_eq!(beijing.name, "北京");
        assert_eq!(beijing.code, "BJP");
        assert_eq!(beijing.pinyin, "beijing");
        assert_eq!(beijing.simple_pinyin, "bj");
        assert_eq!(stations["上海"].code, "SHH");
    }

    #[test]
    fn rejects_malformed_station_tables() {
        assert!(parse_station_table("[]").is_err());
        assert!(parse_station_table("var broken = not json;").is_err());
    }

    #[test]
    fn filters_out_incomplete_passengers() {
        let raw = vec![
            RawPassenger {
                passenger_name: "张三".into(),
                passenger_id_type_code: "1".into(),
                passenger_id_no: "110101199001011234".into(),
                mobile_no: "13800138000".into(),
            },
            RawPassenger {
                passenger_name: "李四".into(),
                passenger_id_type_code: "1".into(),
                passenger_id_no: "110101199001015678".into(),
                mobile_no: String::new(),
            },
        ];
        let passengers = filter_passengers(raw);
        assert_eq!(passengers.len(), 1);
        assert_eq!(passengers[0].name, "张三");
    }

    fn session_with_stations() -> BookingSession {
        let mut session = BookingSession::detached();
        session.stations = parse_station_table(STATION_TABLE_JS).unwrap();
        session
    }

    #[test]
    fn unknown_station_short_circuits_the_ticket_query() {
        // A detached session has no client at all, so a non-empty result or
        // a request attempt would be impossible to miss.
        let session = session_with_stations();
        assert_eq!(session.station_code("北京"), Some("BJP"));
        assert!(session.station_code("nowhere").is_none());
        assert!(session.query_tickets("2099-01-01", "北京", "nowhere").is_empty());
    }

    #[test]
    fn past_date_short_circuits_the_ticket_query() {
        let session = session_with_stations();
        assert!(session.query_tickets("2020-01-01", "北京", "上海").is_empty());
    }

    #[test]
    fn poll_stops_as_soon_as_the_ticket_is_issued() {
        let mut calls = 0;
        let outcome = poll_until_ticketed(
            |_| {
                calls += 1;
                if calls == 3 { Some(ORDER_STATUS_TICKETED) } else { Some(1) }
            },
            Duration::ZERO,
        );
        assert_eq!(outcome, PollOutcome::Ticketed { attempts: 3 });
        assert_eq!(calls, 3);
    }

    #[test]
    fn poll_times_out_after_the_attempt_cap() {
        let mut calls = 0;
        let outcome = poll_until_ticketed(
            |_| {
                calls += 1;
                None
            },
            Duration::ZERO,
        );
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(calls, MAX_STATUS_POLLS);
    }

    #[test]
    fn logout_without_a_live_session_is_a_noop() {
        let mut session = BookingSession::detached();
        session.logout();
        session.logout();
    }

    #[test]
    fn passenger_strings_follow_the_site_grammar() {
        let passenger = Passenger {
            name: "张三".into(),
            id_type: "1".into(),
            id_number: "110101199001011234".into(),
            phone: "13800138000".into(),
        };
        let train: TrainOption = serde_json::from_str(
            r#"{"date":"2099-01-01","train_no":"240000G1010I","station_train_code":"G101","seat_type":"O"}"#,
        )
        .unwrap();

        assert_eq!(
            passenger_ticket_str(&passenger, &train),
            "张三,1,1,110101199001011234,1,O,"
        );
        assert_eq!(old_passenger_str(&passenger), "张三,1,110101199001011234,1_");
    }
}
