//! BLE Mesh Node - client node against a simulated Generic OnOff server
//!
//! This binary runs the full stack in-process:
//! - A MeshStack processing task over a loopback transport
//! - An event delivery task invoking logging callbacks
//! - A caller loop issuing Generic OnOff Get/Set requests

mod loopback;

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use blemesh_bridge::{
    CallbackRegistry, ClientCallbacks, MeshStack, ReceivedMessage, SendComplete, TimeoutNotice,
};
use blemesh_core::{Address, MsgContext, Opcode, StackConfig};
use blemesh_models::{Composition, Element, Model, ModelId, Request, Subsystem};
use loopback::{LoopbackConfig, LoopbackTransport, ONOFF_GET, ONOFF_SET};

const ONOFF_CLIENT: ModelId = ModelId::new(0, 0);

#[derive(Parser)]
#[command(name = "blemesh-node")]
#[command(about = "BLE Mesh client node against a simulated Generic OnOff server")]
struct Args {
    /// Stack configuration file (JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Number of requests to send
    #[arg(long, short = 'n', default_value_t = 6)]
    requests: u32,

    /// Unicast address of the simulated server
    #[arg(long, default_value = "0x0010", value_parser = parse_unicast)]
    dst: Address,

    /// Share of responses the simulated server drops (0..1)
    #[arg(long, default_value_t = 0.2)]
    drop_rate: f64,

    /// Response timeout, overriding the configured default (e.g. "500ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

fn parse_unicast(s: &str) -> Result<Address, String> {
    let raw = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    }
    .map_err(|e| format!("invalid address {}: {}", s, e))?;

    let addr = Address::new(raw);
    if !addr.is_unicast() {
        return Err(format!("{} is not a unicast address", addr));
    }
    Ok(addr)
}

/// Outcome of one request, as seen by the callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Answered,
    TimedOut,
}

/// Logs client events and reports terminal outcomes to the caller loop
struct LoggingCallbacks {
    done: mpsc::UnboundedSender<Completion>,
}

impl ClientCallbacks for LoggingCallbacks {
    fn on_matched(&self, request: Opcode, message: &ReceivedMessage) {
        info!(
            "{} answered by {} with {} {:02X?}{}",
            request,
            message.ctx.addr,
            message.opcode,
            message.payload,
            if message.degraded { " (degraded)" } else { "" }
        );
        let _ = self.done.send(Completion::Answered);
    }

    fn on_unsolicited(&self, message: &ReceivedMessage) {
        info!(
            "Unsolicited {} from {} {:02X?}",
            message.opcode, message.ctx.addr, message.payload
        );
    }

    fn on_timeout(&self, notice: &TimeoutNotice) {
        warn!("{} to {} timed out", notice.opcode, notice.ctx.addr);
        let _ = self.done.send(Completion::TimedOut);
    }

    fn on_send_complete(&self, complete: &SendComplete) {
        if let Err(e) = &complete.result {
            warn!("{} to {} not sent: {}", complete.opcode, complete.ctx.addr, e);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !(0.0..=1.0).contains(&args.drop_rate) {
        bail!("--drop-rate must be between 0 and 1, got {}", args.drop_rate);
    }

    let mut config = match &args.config {
        Some(path) => StackConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StackConfig::default(),
    };
    if let Some(timeout) = args.timeout {
        config.client.default_timeout = timeout;
    }

    info!(
        "Starting BLE Mesh node: {} requests to {}, drop rate {}, timeout {:?}",
        args.requests, args.dst, args.drop_rate, config.client.default_timeout
    );

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let registry = CallbackRegistry::new();
    registry.register_client(
        Subsystem::GenericClient,
        Arc::new(LoggingCallbacks { done: done_tx }),
    )?;

    let composition = Composition::new().with_element(
        Element::new(0)
            .with_model(Model::generic_onoff_client())
            .with_model(Model::config_client()),
    )?;
    let transport = LoopbackTransport::new(LoopbackConfig {
        drop_rate: args.drop_rate,
        ..LoopbackConfig::default()
    });

    let (stack, handle, delivery) = MeshStack::new(config, composition, transport, registry)?;
    let stack_task = tokio::spawn(stack.run());
    let delivery_task = tokio::spawn(delivery.run());

    let mut answered = 0u32;
    let mut timed_out = 0u32;
    for i in 0..args.requests {
        // alternate Get and Set, Set toggling the light with a fresh TID
        let tid = i as u8;
        let params = [(i / 2 % 2) as u8, tid];
        let req = if i % 2 == 0 {
            Request::new(MsgContext::to(args.dst), ONOFF_GET, &[])
        } else {
            Request::new(MsgContext::to(args.dst), ONOFF_SET, &params)
        };

        if let Err(e) = handle.send_request(ONOFF_CLIENT, &req).await {
            warn!("Request {} refused: {}", i, e);
            continue;
        }
        match done_rx.recv().await {
            Some(Completion::Answered) => answered += 1,
            Some(Completion::TimedOut) => timed_out += 1,
            None => bail!("event delivery stopped"),
        }
    }

    let stats = handle.stats().await?;
    info!(
        "Done: {} answered, {} timed out of {} requests",
        answered, timed_out, args.requests
    );
    info!(
        "Stack stats: calls={}, sent={}, busy={}, matched={}, unsolicited={}, timeouts={}",
        stats.calls,
        stats.requests_sent,
        stats.busy,
        stats.matched,
        stats.unsolicited,
        stats.timeouts
    );
    info!(
        "Event stats: posted={}, skipped={}, backlogged={}, dispatch_failures={}",
        stats.events_posted,
        stats.events_skipped,
        stats.events_backlogged,
        stats.event_dispatch_failures
    );

    handle.shutdown().await?;
    stack_task.await??;
    let delivered = delivery_task.await?;
    info!("Node stopped after {} delivered events", delivered);
    Ok(())
}
