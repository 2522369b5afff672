use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use espwire_frame::{hex, AlertData, Body, DisplayData, Frame, Packet, Personality};
use espwire_transport::LinkKind;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of JSON output; `event` tells consumers what `data` holds.
#[derive(Serialize)]
struct Event<'a, T: Serialize> {
    event: &'a str,
    data: T,
}

fn print_json<T: Serialize>(event: &str, data: T) {
    println!(
        "{}",
        serde_json::to_string(&Event { event, data }).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let frame = packet.frame();
    match format {
        OutputFormat::Json => print_json("packet", packet),
        OutputFormat::Table => {
            let mut table = table(vec!["ORIGIN", "DEST", "KIND", "PAYLOAD", "BODY"]);
            table.add_row(vec![
                frame.origin().name().to_string(),
                frame.destination().name().to_string(),
                format!("{:02X} {}", frame.kind(), frame.kind_name()),
                hex::encode(frame.payload()),
                body_summary(packet.body()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} -> {} [{}] {}",
                frame.kind_name(),
                frame.origin(),
                frame.destination(),
                hex::encode(frame.payload()),
                body_summary(packet.body())
            );
        }
    }
}

pub fn print_display(display: &DisplayData, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json("display", display),
        OutputFormat::Table => {
            let mut table = table(vec!["MODE", "BARS", "BANDS", "ARROWS", "FLAGS"]);
            table.add_row(vec![
                format!("{:?}", display.mode()),
                display.bar_graph_level().to_string(),
                bands(display),
                arrows(display),
                flags(display),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "display mode={:?} bars={} bands={} arrows={} flags={}",
                display.mode(),
                display.bar_graph_level(),
                bands(display),
                arrows(display),
                flags(display)
            );
        }
    }
}

pub fn print_alerts(alerts: &[AlertData], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json("alerts", alerts),
        OutputFormat::Table => {
            let mut table = table(vec!["#", "BAND", "FREQ", "DIR", "FRONT", "REAR", "PRIO"]);
            for alert in alerts {
                table.add_row(vec![
                    alert.index.to_string(),
                    alert.band.to_string(),
                    alert.frequency.to_string(),
                    alert.direction.to_string(),
                    alert.front_strength.to_string(),
                    alert.rear_strength.to_string(),
                    alert.priority.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if alerts.is_empty() {
                println!("alerts: none");
            }
            for alert in alerts {
                println!(
                    "alert {}/{} {} {} MHz {}{}",
                    alert.index,
                    alert.count,
                    alert.band,
                    alert.frequency,
                    alert.direction,
                    if alert.priority { " (priority)" } else { "" }
                );
            }
        }
    }
}

pub fn print_notification(text: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json("notification", text),
        OutputFormat::Table | OutputFormat::Pretty => println!("note: {text}"),
    }
}

#[derive(Serialize)]
struct WireOutput<'a> {
    frame: &'a Frame,
    link: String,
    personality: Personality,
    wire: String,
}

pub fn print_wire(
    frame: &Frame,
    wire: &[u8],
    link: LinkKind,
    personality: Personality,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(
            "wire",
            WireOutput {
                frame,
                link: link.to_string(),
                personality,
                wire: hex::encode(wire),
            },
        ),
        OutputFormat::Table => {
            let mut table = table(vec!["KIND", "DEST", "LINK", "PERSONALITY", "WIRE"]);
            table.add_row(vec![
                frame.kind_name().to_string(),
                frame.destination().name().to_string(),
                link.to_string(),
                personality.to_string(),
                hex::encode(wire),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex::encode(wire)),
    }
}

fn body_summary(body: &Body) -> String {
    match body {
        Body::Version(version) => version.to_string(),
        Body::SerialNumber(serial) => serial.clone(),
        Body::BatteryVoltage(voltage) => voltage.to_string(),
        Body::MaxSweepIndex(n) | Body::SweepWriteResult(n) | Body::VehicleSpeed(n) => n.to_string(),
        Body::DisplayData(display) => {
            format!("mode={:?} bars={}", display.mode(), display.bar_graph_level())
        }
        Body::AlertData(alert) => format!(
            "{}/{} {} {} MHz {}",
            alert.index, alert.count, alert.band, alert.frequency, alert.direction
        ),
        Body::Unsupported { kind }
        | Body::RequestNotProcessed { kind }
        | Body::DataError { kind } => {
            format!("kind={kind:02X}")
        }
        Body::Busy { kinds } => format!("busy={}", hex::encode(kinds)),
        Body::DataReceived | Body::Request | Body::Unknown => "-".to_string(),
        other => serde_json::to_value(other)
            .ok()
            .and_then(|value| value.get("data").map(|data| data.to_string()))
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn bands(display: &DisplayData) -> String {
    let lit: Vec<&str> = [
        (display.is_laser(), "L"),
        (display.is_ka(), "Ka"),
        (display.is_k(), "K"),
        (display.is_x(), "X"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect();
    if lit.is_empty() {
        "-".to_string()
    } else {
        lit.join(",")
    }
}

fn arrows(display: &DisplayData) -> String {
    let lit: Vec<&str> = [
        (display.is_front(), "front"),
        (display.is_side(), "side"),
        (display.is_rear(), "rear"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect();
    if lit.is_empty() {
        "-".to_string()
    } else {
        lit.join(",")
    }
}

fn flags(display: &DisplayData) -> String {
    let mut out = Vec::new();
    if display.is_display_on() {
        out.push("display-on");
    }
    if display.is_soft() {
        out.push("soft");
    }
    if display.is_euro() {
        out.push("euro");
    }
    if display.is_custom_sweep() {
        out.push("custom-sweep");
    }
    if display.is_legacy() {
        out.push("legacy");
    }
    if display.is_time_slice_holdoff() {
        out.push("holdoff");
    }
    if out.is_empty() {
        "-".to_string()
    } else {
        out.join(",")
    }
}
