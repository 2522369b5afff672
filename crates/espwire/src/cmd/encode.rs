use espwire_frame::{encode_for_link, hex, packet_id, request, DeviceId, Frame, Personality};
use espwire_transport::LinkKind;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let kind = parse_kind(&args.kind)?;
    let destination = match &args.dest {
        Some(text) => parse_device(text)?,
        None => request::V1,
    };
    let payload = match &args.payload {
        Some(text) => hex::decode(text).map_err(|err| frame_error("invalid payload", err))?,
        None => Vec::new(),
    };

    let personality = Personality::from(args.personality);
    let link = LinkKind::from(args.link);
    let frame = Frame::new(DeviceId::V1Connection, destination, kind, payload);
    let wire =
        encode_for_link(&frame, personality, link)
            .map_err(|err| frame_error("encode failed", err))?;

    print_wire(&frame.resolve(personality), &wire, link, personality, format);
    Ok(SUCCESS)
}

/// A packet name such as `REQVERSION`, or a number (`0x01`, `01`).
fn parse_kind(text: &str) -> CliResult<u8> {
    if let Some(kind) = packet_id::from_name(text) {
        return Ok(kind);
    }
    parse_hex_byte(text)
        .ok_or_else(|| CliError::new(USAGE, format!("unknown packet kind: {text}")))
}

fn parse_device(text: &str) -> CliResult<DeviceId> {
    match parse_hex_byte(text) {
        Some(id) if id <= 0x0F => Ok(DeviceId::from_nibble(id)),
        _ => Err(CliError::new(
            USAGE,
            format!("device id must be a hex nibble (0-F): {text}"),
        )),
    }
}

fn parse_hex_byte(text: &str) -> Option<u8> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u8::from_str_radix(digits, 16).ok()
}
