use espwire_frame::{hex, FrameDecoder, Packet, Personality};
use espwire_transport::LinkKind;
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let personality = Personality::from(args.personality);
    let mut decoder = FrameDecoder::new(LinkKind::from(args.link));
    let mut decoded = 0usize;
    let mut malformed = 0usize;

    for text in &args.hex {
        let bytes = hex::decode(text).map_err(|err| frame_error("invalid input", err))?;
        decoder.push(&bytes);

        loop {
            match decoder.next_frame(personality) {
                Ok(Some(frame)) => match Packet::decode(frame) {
                    Ok(packet) => {
                        print_packet(&packet, format);
                        decoded += 1;
                    }
                    Err(err) => {
                        warn!(error = %err, "cannot decode payload");
                        malformed += 1;
                    }
                },
                Ok(None) => break,
                Err(err) if err.is_malformed() => {
                    warn!(error = %err, "malformed frame");
                    malformed += 1;
                }
                Err(err) => debug!(error = %err, "frame skipped"),
            }
        }
    }

    if decoder.buffered() > 0 {
        warn!(buffered = decoder.buffered(), "input ends inside a frame");
    }
    if malformed > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{malformed} malformed frame(s), {decoded} decoded"),
        ));
    }
    if decoded == 0 {
        return Err(CliError::new(DATA_INVALID, "no complete frame in input"));
    }
    Ok(SUCCESS)
}
