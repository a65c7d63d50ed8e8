use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio::{io::BufReader, sync::mpsc, task::JoinHandle};
use tracing::debug;
use wms_ptl::{
    auth::{clear_session, default_session_path, read_session, save_session, TokenPair},
    client::{ApiClient, ApiClientConfig, HttpWmsApi, WmsApi},
    config::{self, AppConfig},
    events::{EventSender, Notice, Severity},
    kiosk::{self, KioskSettings},
    models::{KitMerge, KitMergeType, MissionKitMergeItem, PtlRecord},
    services::{KitMergeService, PtlService},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let context = CliContext::initialize().await?;
            handle_run(&context, args, cli.json).await?
        }
        Commands::KitMerges(command) => {
            let context = CliContext::initialize().await?;
            handle_kit_merge_command(&context, command, cli.json).await?
        }
        Commands::Ptl(command) => {
            let context = CliContext::initialize().await?;
            handle_ptl_command(&context, command, cli.json).await?
        }
        Commands::Mission(command) => {
            let context = CliContext::initialize().await?;
            handle_mission_command(&context, command, cli.json).await?
        }
        // session management works without a reachable API configuration
        Commands::Session(command) => handle_session_command(command, cli.json)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "ptl-kiosk",
    about = "Kit-merge pick-to-light reconciliation kiosk and admin CLI",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scanner loop for one gate on stdin
    Run(RunArgs),
    #[command(subcommand)]
    KitMerges(KitMergeCommands),
    #[command(subcommand)]
    Ptl(PtlCommands),
    #[command(subcommand)]
    Mission(MissionCommands),
    #[command(subcommand)]
    Session(SessionCommands),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, help = "Outbound gate; defaults to the configured gate")]
    gate: Option<String>,
    #[arg(long = "type", help = "Kit-merge type (odd|standard); defaults to config")]
    kind: Option<KitMergeType>,
}

#[derive(Subcommand)]
enum KitMergeCommands {
    /// Show the in-progress batch at a gate
    Active(ActiveKitMergeArgs),
}

#[derive(Args)]
struct ActiveKitMergeArgs {
    #[arg(long, help = "Outbound gate; defaults to the configured gate")]
    gate: Option<String>,
    #[arg(long = "type", help = "Kit-merge type (odd|standard); defaults to config")]
    kind: Option<KitMergeType>,
}

#[derive(Subcommand)]
enum PtlCommands {
    /// List PTL records of one or more kits
    List(PtlListArgs),
    /// Set the picked quantity of one record by id
    Set(PtlSetArgs),
}

#[derive(Args)]
struct PtlListArgs {
    #[arg(long = "kit", required = true, num_args = 1.., help = "Kit number (repeatable)")]
    kits: Vec<String>,
}

#[derive(Args)]
struct PtlSetArgs {
    #[arg(long, help = "PTL record id")]
    id: i64,
    #[arg(long, help = "Picked quantity to record")]
    qty: i64,
}

#[derive(Subcommand)]
enum MissionCommands {
    /// Show the mission detail of a kit-merge batch
    Show(MissionShowArgs),
}

#[derive(Args)]
struct MissionShowArgs {
    #[arg(long, help = "Kit-merge id")]
    id: i64,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Store tokens issued by the dashboard login
    Save(SessionSaveArgs),
    Show,
    Clear,
}

#[derive(Args)]
struct SessionSaveArgs {
    #[arg(long, help = "Bearer access token")]
    access_token: String,
    #[arg(long, help = "Refresh token used when the access token expires")]
    refresh_token: Option<String>,
}

struct CliContext {
    config: AppConfig,
    client: ApiClient,
    api: Arc<dyn WmsApi>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let session_path = session_file_path(Some(&config));
        let tokens = match &session_path {
            Some(path) => read_session(path)
                .with_context(|| format!("failed reading session {}", path.display()))?
                .map(|session| session.tokens()),
            None => None,
        };
        if tokens.is_none() {
            debug!(target: "ptl_kiosk", "no saved session; requests go out unauthenticated");
        }

        let mut client_config = ApiClientConfig::from(&config);
        client_config.session_file = session_path;
        let client =
            ApiClient::new(client_config, tokens).context("failed to build the HTTP client")?;
        let api: Arc<dyn WmsApi> = Arc::new(HttpWmsApi::new(client.clone()));

        Ok(Self {
            config,
            client,
            api,
        })
    }

    fn gate(&self, gate: Option<String>) -> Result<String> {
        gate.or_else(|| self.config.gate.clone())
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| anyhow!("no gate given; pass --gate or set APP__GATE"))
    }

    fn kit_merge_service(&self, kind: Option<KitMergeType>) -> KitMergeService {
        KitMergeService::new(self.api.clone())
            .with_filter(kind.unwrap_or(self.config.kit_type), self.config.kit_status)
            .with_page_limit(self.config.kit_merge_page_limit)
    }

    fn ptl_service(&self) -> PtlService {
        PtlService::new(self.api.clone())
    }
}

async fn handle_run(context: &CliContext, args: RunArgs, json: bool) -> Result<()> {
    let gate = context.gate(args.gate)?;
    if context.client.tokens().tokens().await.is_none() {
        eprintln!("No saved session; run `ptl-kiosk session save` first if the API requires auth.");
    }

    let (event_tx, event_rx) = mpsc::channel::<Notice>(context.config.event_channel_capacity);
    let printer = spawn_notice_printer(event_rx, json);

    let mut station = kiosk::station_from_config(
        context.api.clone(),
        EventSender::new(event_tx),
        &context.config,
        gate,
        args.kind,
    );
    let settings = KioskSettings::from_config(&context.config);

    let input = BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let summary = kiosk::run(&mut station, input, &mut output, &settings, shutdown)
        .await
        .context("kiosk loop aborted")?;

    // closing the station's sender lets the printer drain and exit
    drop(station);
    let _ = printer.await;

    if json {
        print_json(&json!({
            "scans": summary.scans,
            "updates": summary.updates,
            "refetches": summary.refetches,
        }))?;
    } else {
        println!(
            "Stopped after {} scan(s), {} update(s), {} re-fetch(es)",
            summary.scans, summary.updates, summary.refetches
        );
    }
    Ok(())
}

fn spawn_notice_printer(mut rx: mpsc::Receiver<Notice>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&notice) {
                    println!("{}", line);
                }
                continue;
            }

            let label = match notice.severity {
                Severity::Info => "INFO ",
                Severity::Warning => "WARN ",
                Severity::Error => "ERROR",
            };
            println!(
                "{} {} {}",
                notice.raised_at.format("%H:%M:%S"),
                label,
                notice.event.message()
            );
        }
    })
}

async fn handle_kit_merge_command(
    context: &CliContext,
    command: KitMergeCommands,
    json: bool,
) -> Result<()> {
    match command {
        KitMergeCommands::Active(args) => {
            let gate = context.gate(args.gate)?;
            let active = context
                .kit_merge_service(args.kind)
                .load_active_kit_merge(&gate)
                .await
                .context("failed to load the active kit merge")?;

            if json {
                print_json(&active)?;
            } else {
                match active {
                    Some(merge) => render_kit_merge(&merge),
                    None => println!("No kit merge in progress at gate {}", gate),
                }
            }
        }
    }
    Ok(())
}

async fn handle_ptl_command(context: &CliContext, command: PtlCommands, json: bool) -> Result<()> {
    match command {
        PtlCommands::List(args) => {
            let records = context
                .ptl_service()
                .load_ptl_records(&args.kits)
                .await
                .context("failed to load PTL records")?;

            if json {
                print_json(&records)?;
            } else if records.is_empty() {
                println!("No PTL records for {}", args.kits.join(", "));
            } else {
                for record in &records {
                    render_ptl_record(record);
                }
            }
        }
        PtlCommands::Set(args) => {
            context
                .ptl_service()
                .update_picked_qty(args.id, args.qty)
                .await
                .with_context(|| format!("failed to update PTL record {}", args.id))?;

            if json {
                print_json(&json!({ "id": args.id, "picked_qty": args.qty }))?;
            } else {
                println!("PTL record {} picked quantity set to {}", args.id, args.qty);
            }
        }
    }
    Ok(())
}

async fn handle_mission_command(
    context: &CliContext,
    command: MissionCommands,
    json: bool,
) -> Result<()> {
    match command {
        MissionCommands::Show(args) => {
            let mission = context
                .kit_merge_service(None)
                .load_mission_detail(args.id)
                .await
                .with_context(|| format!("failed to load mission detail for kit merge {}", args.id))?;

            if json {
                print_json(&mission)?;
            } else {
                render_mission(&mission);
            }
        }
    }
    Ok(())
}

fn handle_session_command(command: SessionCommands, json: bool) -> Result<()> {
    let config = config::load_config().ok();
    let path = session_file_path(config.as_ref())
        .ok_or_else(|| anyhow!("cannot determine a session file location; set PTL_KIOSK_HOME"))?;

    match command {
        SessionCommands::Save(args) => {
            let tokens = TokenPair::new(args.access_token, args.refresh_token.unwrap_or_default());
            save_session(&path, &tokens)
                .with_context(|| format!("failed writing {}", path.display()))?;
            if json {
                print_json(&json!({ "path": path, "saved": true }))?;
            } else {
                println!("Session saved to: {}", path.display());
            }
        }
        SessionCommands::Show => {
            let session = read_session(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            match session {
                Some(session) => {
                    if json {
                        print_json(&json!({
                            "path": path,
                            "token_type": session.token_type,
                            "has_refresh_token": !session.refresh_token.is_empty(),
                            "expires_in": session.expires_in,
                            "saved_at": session.saved_at,
                        }))?;
                    } else {
                        println!("Session file: {}", path.display());
                        println!("Saved at: {}", session.saved_at);
                        println!(
                            "Refresh token: {}",
                            if session.refresh_token.is_empty() { "absent" } else { "present" }
                        );
                    }
                }
                None => println!("No saved session at {}", path.display()),
            }
        }
        SessionCommands::Clear => {
            let removed = clear_session(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
            if json {
                print_json(&json!({ "path": path, "removed": removed }))?;
            } else if removed {
                println!("Removed session file {}", path.display());
            } else {
                println!("No saved session at {}", path.display());
            }
        }
    }
    Ok(())
}

fn session_file_path(config: Option<&AppConfig>) -> Option<PathBuf> {
    config
        .and_then(|c| c.session_file.as_ref())
        .map(PathBuf::from)
        .or_else(default_session_path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_kit_merge(merge: &KitMerge) {
    println!(
        "- Kit merge {} • gate {} • {} • {} • kits {}",
        merge.id,
        merge.gate.as_deref().unwrap_or("-"),
        merge.kind,
        merge.status,
        merge.kit_no.join(", ")
    );
}

fn render_ptl_record(record: &PtlRecord) {
    println!(
        "- PTL {} • kit {} • material {} • picked {}/{} • station {}",
        record.id,
        record.issue_ord_no,
        record.material_no,
        record.picked_qty,
        record.ptl_qty,
        record.station.as_deref().unwrap_or("-")
    );
}

fn render_mission(mission: &MissionKitMergeItem) {
    println!(
        "- Kit merge {} • gate {} • kits {}",
        mission.id,
        mission.gate.as_deref().unwrap_or("-"),
        mission.kit_no.join(", ")
    );
    for inventory in &mission.inventories {
        println!(
            "  • {} x {} @ {}",
            inventory.quantity,
            inventory.material_no,
            inventory.location.as_deref().unwrap_or("-")
        );
    }
}
