//! perch-ctl — command-line interface for the perch daemon.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 9390;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    cameras: usize,
    pending_sessions: usize,
    active_sessions: usize,
}

#[derive(Deserialize)]
struct CameraSummary {
    uuid: String,
    name: String,
    model: String,
    structure: String,
    streaming_enabled: bool,
    motion_detection: bool,
    doorbell: bool,
    active_sessions: usize,
}

#[derive(Deserialize)]
struct StreamingToggleResponse {
    streaming_enabled: bool,
}

#[derive(Deserialize)]
struct StopResponse {
    session_id: String,
    stopped: bool,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to perchd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

async fn post_json<T, R>(url: &str, body: &T) -> Result<R>
where
    T: serde::Serialize,
    R: for<'de> Deserialize<'de>,
{
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to perchd at {} — is it running?", url))?
        .json::<R>()
        .await
        .context("failed to parse response")
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let status: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    println!("perchd up {}s", status.uptime_secs);
    println!(
        "  cameras: {}  pending sessions: {}  active sessions: {}",
        status.cameras, status.pending_sessions, status.active_sessions
    );
    Ok(())
}

async fn cmd_cameras(port: u16) -> Result<()> {
    let cameras: Vec<CameraSummary> = get_json(&format!("{}/cameras", base_url(port))).await?;
    if cameras.is_empty() {
        println!("No cameras.");
        return Ok(());
    }
    for cam in cameras {
        println!("{} ({})", cam.name, cam.model);
        println!("  uuid      {}", cam.uuid);
        println!("  structure {}", cam.structure);
        println!(
            "  streaming {}  motion {}  doorbell {}  active {}",
            if cam.streaming_enabled { "on" } else { "off" },
            cam.motion_detection,
            cam.doorbell,
            cam.active_sessions
        );
    }
    Ok(())
}

async fn cmd_streaming(port: u16, camera: &str, enabled: bool) -> Result<()> {
    let response: StreamingToggleResponse = post_json(
        &format!("{}/cameras/{}/streaming", base_url(port), camera),
        &serde_json::json!({ "enabled": enabled }),
    )
    .await?;
    println!(
        "Streaming {}",
        if response.streaming_enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_stop(port: u16, camera: &str, session: &str) -> Result<()> {
    let response: StopResponse = reqwest::Client::new()
        .delete(format!(
            "{}/cameras/{}/streams/{}",
            base_url(port),
            camera,
            session
        ))
        .send()
        .await
        .context("failed to connect to perchd — is it running?")?
        .json()
        .await
        .context("failed to parse response")?;
    if response.stopped {
        println!("Session {} stopped", response.session_id);
    }
    Ok(())
}

async fn cmd_snapshot(port: u16, camera: &str, out: &str, width: u32) -> Result<()> {
    let bytes = reqwest::get(format!(
        "{}/cameras/{}/snapshot?width={}",
        base_url(port),
        camera,
        width
    ))
    .await
    .context("failed to connect to perchd — is it running?")?
    .error_for_status()
    .context("snapshot request failed")?
    .bytes()
    .await?;
    std::fs::write(out, &bytes).with_context(|| format!("failed to write {out}"))?;
    println!("Wrote {} bytes to {}", bytes.len(), out);
    Ok(())
}

fn usage() -> ! {
    eprintln!("usage: perch-ctl <command>");
    eprintln!();
    eprintln!("  status                          daemon overview");
    eprintln!("  cameras                         list cameras");
    eprintln!("  streaming <camera> on|off       toggle the streaming switch");
    eprintln!("  stop <camera> <session>         stop a streaming session");
    eprintln!("  snapshot <camera> [out] [width] save a still image (default snapshot.jpg)");
    eprintln!();
    eprintln!("PERCH_API__PORT overrides the daemon port (default {DEFAULT_PORT}).");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    let port = std::env::var("PERCH_API__PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    match args.as_slice() {
        ["status"] => cmd_status(port).await,
        ["cameras"] => cmd_cameras(port).await,
        ["streaming", camera, state] => match *state {
            "on" => cmd_streaming(port, camera, true).await,
            "off" => cmd_streaming(port, camera, false).await,
            other => bail!("expected on|off, got {other}"),
        },
        ["stop", camera, session] => cmd_stop(port, camera, session).await,
        ["snapshot", camera] => cmd_snapshot(port, camera, "snapshot.jpg", 1280).await,
        ["snapshot", camera, out] => cmd_snapshot(port, camera, out, 1280).await,
        ["snapshot", camera, out, width] => {
            let width = width.parse().context("width must be a number")?;
            cmd_snapshot(port, camera, out, width).await
        }
        _ => usage(),
    }
}
