//! Typed request API over a [`Connection`].
//!
//! Every method queues one request (or a short chain of them) and reports
//! the outcome once through a completion callback. Callbacks run on engine
//! tasks with no engine lock held.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use espwire_frame::packet_id::*;
use espwire_frame::{
    request, AllVolume, BatteryVoltage, Body, DeviceId, Frame, Mode, Packet, SavvyStatus,
    SweepDefinition, SweepSection, UserBytes, Version, Volume,
};

use crate::aggregate::{SweepDefinitionProcessor, SweepSectionProcessor};
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::request::{lock, Request, RequestFailure, ResponseHandler};

/// Display frames to wait for after a mode change.
const MODE_CHANGE_DISPLAY_FRAMES: u32 = 5;

type Callback<T> = Box<dyn FnOnce(std::result::Result<T, RequestFailure>) + Send>;

/// A completion callback shared by a handler's success and failure paths.
struct Completion<T>(Arc<Mutex<Option<Callback<T>>>>);

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Completion<T> {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce(std::result::Result<T, RequestFailure>) + Send + 'static,
    {
        Self(Arc::new(Mutex::new(Some(Box::new(f)))))
    }

    fn finish(&self, result: std::result::Result<T, RequestFailure>) {
        let callback = lock(&self.0).take();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

/// Handler that completes when `extract` yields a result for a packet of
/// one of `kinds`.
fn keyed<T, E>(kinds: &[u8], completion: Completion<T>, mut extract: E) -> Arc<ResponseHandler>
where
    T: 'static,
    E: FnMut(&Packet) -> Option<std::result::Result<T, RequestFailure>> + Send + 'static,
{
    let failed = completion.clone();
    kinds
        .iter()
        .fold(ResponseHandler::new(), |h, &kind| h.accept(kind))
        .on_success(move |packet| {
            let Some(result) = packet.and_then(&mut extract) else {
                return false;
            };
            completion.finish(result);
            true
        })
        .on_failure(move |failure| failed.finish(Err(failure)))
        .shared()
}

/// Handler that completes once its request has been sent.
fn on_sent(completion: Completion<()>) -> Arc<ResponseHandler> {
    let failed = completion.clone();
    ResponseHandler::new()
        .on_success(move |_| {
            completion.finish(Ok(()));
            true
        })
        .on_failure(move |failure| failed.finish(Err(failure)))
        .shared()
}

/// High-level ESP client.
#[derive(Debug, Clone)]
pub struct EspClient {
    connection: Connection,
}

impl EspClient {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn send(&self, request: Request) {
        self.connection.enqueue(request, false);
    }

    fn fire<F>(&self, frame: Frame, send_next: bool, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        let handler = on_sent(Completion::new(f));
        self.connection
            .enqueue(Request::new(frame).with_handler(handler), send_next);
    }

    /// Firmware version of `destination`.
    pub fn request_version<F>(&self, destination: DeviceId, f: F)
    where
        F: FnOnce(std::result::Result<Version, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_VERSION], Completion::new(f), move |packet| {
            let Body::Version(version) = packet.body() else {
                return None;
            };
            Some(if version.is_well_formed() {
                Ok(version.clone())
            } else {
                Err(RequestFailure::InvalidResponse(format!(
                    "Received a bad version for {}",
                    destination.name()
                )))
            })
        });
        self.send(Request::new(request::version(destination)).with_handler(handler));
    }

    pub fn request_serial_number<F>(&self, destination: DeviceId, f: F)
    where
        F: FnOnce(std::result::Result<String, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_SERIAL_NUMBER], Completion::new(f), |packet| {
            match packet.body() {
                Body::SerialNumber(serial) => Some(Ok(serial.clone())),
                _ => None,
            }
        });
        self.send(Request::new(request::serial_number(destination)).with_handler(handler));
    }

    pub fn request_user_bytes<F>(&self, destination: DeviceId, f: F)
    where
        F: FnOnce(std::result::Result<UserBytes, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_USER_BYTES], Completion::new(f), |packet| match packet.body() {
            Body::UserBytes(bytes) => Some(Ok(*bytes)),
            _ => None,
        });
        self.send(Request::new(request::user_bytes(destination)).with_handler(handler));
    }

    pub fn write_user_bytes<F>(&self, destination: DeviceId, bytes: &UserBytes, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::write_user_bytes(destination, bytes), false, f);
    }

    pub fn request_factory_default<F>(&self, destination: DeviceId, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::factory_default(destination), false, f);
    }

    pub fn request_max_sweep_index<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<u8, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_MAX_SWEEP_INDEX], Completion::new(f), max_sweep_index);
        self.send(Request::new(request::max_sweep_index()).with_handler(handler));
    }

    /// All sweep sections, assembled across responses.
    pub fn request_sweep_sections<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<Vec<SweepSection>, RequestFailure>) + Send + 'static,
    {
        let mut processor = SweepSectionProcessor::new();
        let handler = keyed(&[RESP_SWEEP_SECTIONS], Completion::new(f), move |packet| {
            let Body::SweepSections {
                total,
                contained,
                sections,
            } = packet.body()
            else {
                return None;
            };
            processor.add(*total, *contained, sections).map(Ok)
        });
        self.send(Request::new(request::sweep_sections()).with_handler(handler));
    }

    /// The current custom sweep definitions.
    pub fn request_all_sweep_definitions<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<Vec<SweepDefinition>, RequestFailure>) + Send + 'static,
    {
        self.request_definitions(false, Completion::new(f));
    }

    /// The factory sweep definitions.
    pub fn request_default_sweep_definitions<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<Vec<SweepDefinition>, RequestFailure>) + Send + 'static,
    {
        self.request_definitions(true, Completion::new(f));
    }

    /// Ask for the max sweep index first, then collect that many
    /// definitions.
    fn request_definitions(&self, defaults: bool, completion: Completion<Vec<SweepDefinition>>) {
        let connection = self.connection.clone();
        let failed = completion.clone();
        let on_index = Completion::new(move |result: std::result::Result<u8, RequestFailure>| {
            let max_index = match result {
                Ok(max_index) => max_index,
                Err(failure) => {
                    failed.finish(Err(failure));
                    return;
                }
            };
            let mut processor = SweepDefinitionProcessor::new(max_index);
            let (kind, frame) = if defaults {
                (RESP_DEFAULT_SWEEP_DEFINITIONS, request::default_sweep_definitions())
            } else {
                (RESP_SWEEP_DEFINITION, request::all_sweep_definitions())
            };
            let handler = keyed(&[kind], completion, move |packet| match packet.body() {
                Body::SweepDefinition(definition) | Body::DefaultSweepDefinition(definition) => {
                    processor.add(*definition).map(Ok)
                }
                _ => None,
            });
            connection.enqueue(Request::new(frame).with_handler(handler), false);
        });
        let index_handler = keyed(&[RESP_MAX_SWEEP_INDEX], on_index, max_sweep_index);
        self.send(Request::new(request::max_sweep_index()).with_handler(index_handler));
    }

    pub fn request_default_sweeps<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::default_sweeps(), false, f);
    }

    /// Write custom sweeps. The last definition carries the commit flag and
    /// the detector answers once with a result code.
    pub fn write_sweep_definitions<F>(&self, definitions: &[SweepDefinition], f: F) -> Result<()>
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        if definitions.is_empty() {
            return Err(ClientError::InvalidArgument(
                "no sweep definitions to write".to_string(),
            ));
        }
        let handler = keyed(&[RESP_SWEEP_WRITE_RESULT], Completion::new(f), |packet| {
            let Body::SweepWriteResult(code) = packet.body() else {
                return None;
            };
            Some(match code {
                0 => Ok(()),
                n => Err(RequestFailure::InvalidResponse(format!(
                    "Sweep Definition {n} contains invalid data"
                ))),
            })
        });
        let last = definitions.len() - 1;
        for (i, definition) in definitions.iter().enumerate() {
            let mut definition = *definition;
            definition.commit = i == last;
            self.send(
                Request::new(request::write_sweep_definition(&definition))
                    .with_handler(Arc::clone(&handler)),
            );
        }
        Ok(())
    }

    /// Completes once the detector's display shows the requested mute state.
    pub fn request_mute<F>(&self, on: bool, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[INF_DISPLAY_DATA], Completion::new(f), move |packet| {
            let display = packet.display_data()?;
            (display.is_soft() == on).then_some(Ok(()))
        });
        self.send(Request::new(request::mute(on)).with_handler(handler));
    }

    /// Completes once the display reports the requested on/off state.
    pub fn request_display_on<F>(&self, on: bool, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[INF_DISPLAY_DATA], Completion::new(f), move |packet| {
            let display = packet.display_data()?;
            (display.is_display_on() == on).then_some(Ok(()))
        });
        self.send(Request::new(request::display(on)).with_handler(handler));
    }

    pub fn request_change_mode<F>(&self, mode: Mode, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        let mut seen = 0;
        let handler = keyed(&[INF_DISPLAY_DATA], Completion::new(f), move |packet| {
            packet.display_data()?;
            seen += 1;
            (seen >= MODE_CHANGE_DISPLAY_FRAMES).then_some(Ok(()))
        });
        self.send(Request::new(request::change_mode(mode)).with_handler(handler));
    }

    /// Completes on the first alert entry after alert data is switched on.
    pub fn request_start_alert_data<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_ALERT_DATA], Completion::new(f), |packet| {
            packet.alert_data().map(|_| Ok(()))
        });
        self.send(Request::new(request::start_alert_data()).with_handler(handler));
    }

    pub fn request_stop_alert_data<F>(&self, send_next: bool, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::stop_alert_data(), send_next, f);
    }

    pub fn request_battery_voltage<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<BatteryVoltage, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_BATTERY_VOLTAGE], Completion::new(f), |packet| {
            match packet.body() {
                Body::BatteryVoltage(voltage) => Some(Ok(*voltage)),
                _ => None,
            }
        });
        self.send(Request::new(request::battery_voltage()).with_handler(handler));
    }

    /// SAVVY status. `timeout` overrides the engine's response timeout.
    pub fn request_savvy_status<F>(&self, timeout: Option<Duration>, f: F)
    where
        F: FnOnce(std::result::Result<SavvyStatus, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_SAVVY_STATUS], Completion::new(f), |packet| {
            match packet.body() {
                Body::SavvyStatus(status) => Some(Ok(*status)),
                _ => None,
            }
        });
        let mut request = Request::new(request::savvy_status()).with_handler(handler);
        if let Some(timeout) = timeout {
            request = request.with_timeout(timeout);
        }
        self.send(request);
    }

    pub fn request_vehicle_speed<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<u8, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_VEHICLE_SPEED], Completion::new(f), |packet| {
            match packet.body() {
                Body::VehicleSpeed(speed) => Some(Ok(*speed)),
                _ => None,
            }
        });
        self.send(Request::new(request::vehicle_speed()).with_handler(handler));
    }

    pub fn request_override_thumbwheel<F>(&self, speed: u8, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::override_thumbwheel(speed), false, f);
    }

    pub fn request_savvy_unmute<F>(&self, enable: bool, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::savvy_unmute_enable(enable), false, f);
    }

    pub fn request_current_volume<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<Volume, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_CURRENT_VOLUME], Completion::new(f), |packet| {
            match packet.body() {
                Body::CurrentVolume(volume) => Some(Ok(*volume)),
                _ => None,
            }
        });
        self.send(Request::new(request::current_volume()).with_handler(handler));
    }

    pub fn request_all_volume<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<AllVolume, RequestFailure>) + Send + 'static,
    {
        let handler = keyed(&[RESP_ALL_VOLUME], Completion::new(f), |packet| {
            match packet.body() {
                Body::AllVolume(volume) => Some(Ok(*volume)),
                _ => None,
            }
        });
        self.send(Request::new(request::all_volume()).with_handler(handler));
    }

    pub fn write_volume<F>(&self, main: u8, muted: u8, aux0: u8, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::write_volume(main, muted, aux0), false, f);
    }

    pub fn request_abort_audio_delay<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::abort_audio_delay(), false, f);
    }

    pub fn request_display_current_volume<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<(), RequestFailure>) + Send + 'static,
    {
        self.fire(request::display_current_volume(), false, f);
    }
}

fn max_sweep_index(packet: &Packet) -> Option<std::result::Result<u8, RequestFailure>> {
    match packet.body() {
        Body::MaxSweepIndex(index) => Some(Ok(*index)),
        _ => None,
    }
}
