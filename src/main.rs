//! Plancanvas CLI - persistence and versioning for planning canvases.

use clap::Parser;
use plancanvas::cli::{
    BackupCommands, CanvasCommands, Cli, Commands, ConfigCommands, NodeCommands, PromptCommands,
    ShareCommands, SlotCommands, TimerCommands,
};
use plancanvas::commands::{self, Context, Output, PromptChange};
use plancanvas::config::{ConfigOverrides, OutputFormat, resolve_config, system_config_path};
use plancanvas::models::Position;
use plancanvas::session::TimerAction;
use plancanvas::storage::{Principal, SqliteStore, get_data_dir};
use plancanvas::{Error, Result};
use std::process;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "PLANCANVAS_LOG";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut human = cli.human_readable;
    if let Err(e) = run(cli, &mut human) {
        if e.is_recoverable() {
            warn!(error = %e, "command failed");
        } else {
            error!(error = %e, "command failed");
        }
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli, human: &mut bool) -> Result<()> {
    let data_dir = get_data_dir()?;
    let mut overrides = ConfigOverrides::new();
    if let Some(ms) = cli.debounce_ms {
        overrides = overrides.with_debounce_ms(ms);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    let config = resolve_config(&data_dir, system_config_path().as_deref(), &overrides)?;
    *human = config.output_format() == OutputFormat::Human;
    debug!(data_dir = %data_dir.display(), "resolved configuration");

    // Config inspection needs no session
    if let Commands::Config {
        command: ConfigCommands::Show,
    } = cli.command
    {
        output(&commands::config_show(&data_dir, config), *human);
        return Ok(());
    }

    let user_id = cli
        .user
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(Error::Auth)?;
    let email = cli
        .email
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| format!("{}@localhost", user_id));

    std::fs::create_dir_all(&data_dir)?;
    let store = SqliteStore::open(&data_dir.join("store.db"))?
        .with_principal(Principal::new(user_id.clone(), email));

    let ctx = Context {
        store,
        data_dir,
        config,
        user_id,
        canvas: cli.canvas.filter(|c| !c.trim().is_empty()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_command(cli.command, &ctx, *human))
}

async fn run_command(command: Commands, ctx: &Context, human: bool) -> Result<()> {
    match command {
        Commands::Canvas { command } => match command {
            CanvasCommands::Show => output(&commands::canvas_show(ctx).await?, human),
            CanvasCommands::List => output(&commands::canvas_list(ctx)?, human),
            CanvasCommands::Create { title } => {
                output(&commands::canvas_create(ctx, title)?, human)
            }
            CanvasCommands::Title { title } => {
                output(&commands::canvas_title(ctx, &title).await?, human)
            }
            CanvasCommands::Export { outline, output: path } => {
                let result = commands::canvas_export(ctx, outline, path.as_deref()).await?;
                output(result.as_ref(), human);
            }
            CanvasCommands::Import { file, yes } => {
                output(&commands::canvas_import(ctx, &file, yes).await?, human)
            }
        },

        Commands::Node { command } => match command {
            NodeCommands::Add {
                kind,
                title,
                x,
                y,
                id,
            } => {
                let result =
                    commands::node_add(ctx, id, &kind, title, Position::new(x, y)).await?;
                output(&result, human);
            }
            NodeCommands::Rename { id, title } => {
                output(&commands::node_rename(ctx, &id, &title).await?, human)
            }
            NodeCommands::Delete { id } => output(&commands::node_delete(ctx, &id).await?, human),
            NodeCommands::Move { id, x, y, cascade } => {
                let result = commands::node_move(ctx, &id, Position::new(x, y), cascade).await?;
                output(&result, human);
            }
        },

        Commands::Connect {
            source,
            target,
            source_prompt,
            target_prompt,
            id,
        } => {
            let result = commands::connect(
                ctx,
                id,
                &source,
                &target,
                source_prompt.as_deref(),
                target_prompt.as_deref(),
            )
            .await?;
            output(&result, human);
        }

        Commands::Disconnect { edge_id } => {
            output(&commands::disconnect(ctx, &edge_id).await?, human)
        }

        Commands::Prompt { command } => {
            let result = match command {
                PromptCommands::Add { node, content } => {
                    commands::prompt_add(ctx, &node, &content).await?
                }
                PromptCommands::Edit {
                    node,
                    prompt,
                    content,
                } => commands::prompt_change(ctx, &node, &prompt, PromptChange::Edit(content))
                    .await?,
                PromptCommands::Done { node, prompt } => {
                    commands::prompt_change(ctx, &node, &prompt, PromptChange::Completed(true))
                        .await?
                }
                PromptCommands::Undone { node, prompt } => {
                    commands::prompt_change(ctx, &node, &prompt, PromptChange::Completed(false))
                        .await?
                }
                PromptCommands::Delete { node, prompt } => {
                    commands::prompt_change(ctx, &node, &prompt, PromptChange::Delete).await?
                }
            };
            output(&result, human);
        }

        Commands::Timer { command } => {
            let (node, action) = match command {
                TimerCommands::Start { node } => (node, TimerAction::Started),
                TimerCommands::Stop { node } => (node, TimerAction::Stopped),
            };
            output(&commands::timer(ctx, &node, action).await?, human);
        }

        Commands::Backup { command } => match command {
            BackupCommands::List => output(&commands::backup_list(ctx).await?, human),
            BackupCommands::Restore { version } => {
                output(&commands::backup_restore(ctx, version).await?, human)
            }
        },

        Commands::Slot { command } => match command {
            SlotCommands::Save { slot, name } => {
                output(&commands::slot_save(ctx, slot, name).await?, human)
            }
            SlotCommands::Load { slot } => output(&commands::slot_load(ctx, slot).await?, human),
            SlotCommands::List => output(&commands::slot_list(ctx).await?, human),
            SlotCommands::Delete { slot } => {
                output(&commands::slot_delete(ctx, slot).await?, human)
            }
        },

        Commands::Events {
            types,
            range,
            limit,
        } => output(&commands::events(ctx, &types, &range, limit).await?, human),

        Commands::Share { command } => match command {
            ShareCommands::List => output(&commands::share_list(ctx).await?, human),
            ShareCommands::Add { email, level } => {
                output(&commands::share_add(ctx, &email, &level).await?, human)
            }
            ShareCommands::Remove { email } => {
                output(&commands::share_remove(ctx, &email).await?, human)
            }
        },

        Commands::Config {
            command: ConfigCommands::Show,
        } => output(
            &commands::config_show(&ctx.data_dir, ctx.config.clone()),
            human,
        ),
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output + ?Sized>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
