use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use espwire_client::{ClientConfig, Connection, DemoConfig, DemoReplay, EspListener};
use espwire_frame::{AlertData, DisplayData};
use espwire_transport::{LinkKind, MemoryTransport};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::cmd::ReplayArgs;
use crate::exit::{client_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_alerts, print_display, print_notification, OutputFormat};

const FINISH_POLL: Duration = Duration::from_millis(50);

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let data = std::fs::read_to_string(&args.file)
        .map_err(|err| io_error(&format!("cannot read {}", args.file.display()), err))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    let stop = Arc::new(Notify::new());
    install_ctrlc_handler(Arc::clone(&stop))?;

    let config = DemoConfig::new(data)
        .with_repeat(!args.no_repeat)
        .with_frame_interval(Duration::from_millis(args.interval));
    let printer = Arc::new(Printer::new(format, args.count));

    runtime.block_on(async {
        // Demo mode never writes; the transport only names the link.
        let transport = Arc::new(MemoryTransport::new(LinkKind::Stream));
        let connection = Connection::new(transport, ClientConfig::default())
            .map_err(|err| client_error("engine setup failed", err))?;
        connection.add_listener(printer.clone());

        let replay = DemoReplay::start(&connection, config)
            .map_err(|err| client_error("replay failed", err))?;
        info!(file = %args.file.display(), "replay started");

        tokio::select! {
            _ = stop.notified() => info!("interrupted"),
            _ = printer.done.notified() => {}
            _ = until_finished(&replay) => {}
        }
        replay.stop();
        replay.finished().await;
        Ok::<_, CliError>(SUCCESS)
    })
}

async fn until_finished(replay: &DemoReplay) {
    while !replay.is_finished() {
        tokio::time::sleep(FINISH_POLL).await;
    }
}

/// Prints what the engine surfaces and signals once `limit` items are out.
struct Printer {
    format: OutputFormat,
    limit: Option<usize>,
    printed: AtomicUsize,
    done: Notify,
}

impl Printer {
    fn new(format: OutputFormat, limit: Option<usize>) -> Self {
        Self {
            format,
            limit,
            printed: AtomicUsize::new(0),
            done: Notify::new(),
        }
    }

    /// Whether another item may be printed; counts it if so.
    fn claim(&self) -> bool {
        let Some(limit) = self.limit else {
            return true;
        };
        let claimed = self
            .printed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            });
        match claimed {
            Ok(n) if n + 1 == limit => {
                self.done.notify_one();
                true
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

impl EspListener for Printer {
    fn on_display_data(&self, display: &DisplayData) {
        if self.claim() {
            print_display(display, self.format);
        }
    }

    fn on_alert_table(&self, alerts: &[AlertData]) {
        if self.claim() {
            print_alerts(alerts, self.format);
        }
    }

    fn on_notification(&self, text: &str) {
        if self.claim() {
            print_notification(text, self.format);
        }
    }

    fn on_malformed_data(&self, message: &str) {
        warn!(detail = message, "malformed demo data");
    }
}

fn install_ctrlc_handler(stop: Arc<Notify>) -> CliResult<()> {
    ctrlc::set_handler(move || stop.notify_one())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
