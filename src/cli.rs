use clap::Parser;

/// A CLI assistant for booking 12306 train tickets.
/// Run the program without flags and it will guide you through the booking process.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Test mode: stop after order initialization and print the would-be
    /// submission instead of sending it
    #[arg(long)]
    pub test: bool,

    /// Travel date (YYYY-MM-DD); prompted for when omitted
    #[arg(long, short = 'd', value_name = "DATE")]
    pub date: Option<String>,

    /// Departure station name; prompted for when omitted
    #[arg(long, short = 'f', value_name = "STATION")]
    pub from: Option<String>,

    /// Arrival station name; prompted for when omitted
    #[arg(long, short = 't', value_name = "STATION")]
    pub to: Option<String>,

    /// Preferred seat type code (e.g. O for second class, M for first class)
    #[arg(long, short = 's', value_name = "SEAT_TYPE")]
    pub seat_type: Option<String>,

    /// Fetch and list the station directory, then exit
    #[arg(long)]
    pub list_stations: bool,
}
