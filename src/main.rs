use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use ipc_stubgen::dispatch::DispatchError;
use ipc_stubgen::model::{DefaultNameProvider, ModelError, Module, OpcodeAssigner};
use ipc_stubgen::msgbuf::{
    BufferRegistry, LayoutError, MessageStruct, MsgSizeSummary, StructKind, StructLayoutBuilder,
};
use ipc_stubgen::role::{RoleError, RoleKind, Side, StubAssembler};
use ipc_stubgen::{CompilationConfig, ConfigError, DispatchTableBuilder};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Stub assembly error: {0}")]
    Role(#[from] RoleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Role '{0}' is bound to an interface; use the dispatch command or omit --operation")]
    InterfaceRole(RoleKind),
}

/// Output format for generated reports.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON via serde.
    Json,
}

#[derive(Parser)]
#[command(name = "ipc-stubgen")]
#[command(about = "Compute message layouts, stub plans and dispatch tables for IPC interfaces")]
struct Cli {
    /// Compilation config file (TOML)
    #[arg(short, long, global = true, env = "IPC_STUBGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the message struct layouts of every operation
    Layout {
        /// Path to the serialized interface model
        model: PathBuf,

        /// Only show operations of this interface
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Print the MsgSize annotation of every operation
    Msgsize {
        /// Path to the serialized interface model
        model: PathBuf,
    },

    /// Print the assembled plan of one stub
    Plan {
        /// Path to the serialized interface model
        model: PathBuf,

        #[arg(short, long)]
        interface: String,

        /// Operation name (omit for interface-bound roles)
        #[arg(short, long)]
        operation: Option<String>,

        #[arg(short, long, value_enum, default_value_t = RoleKind::Call)]
        role: RoleKind,

        #[arg(short, long, value_enum, default_value_t = Side::Client)]
        side: Side,
    },

    /// Print the dispatch table of an interface
    Dispatch {
        /// Path to the serialized interface model
        model: PathBuf,

        #[arg(short, long)]
        interface: String,

        /// Drop failing candidates and report them instead of aborting
        #[arg(long)]
        recover: bool,
    },
}

#[derive(Serialize)]
struct OperationLayout<'a> {
    interface: &'a str,
    operation: &'a str,
    structs: Vec<MessageStruct>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CompilationConfig, AppError> {
    match path {
        Some(path) => Ok(CompilationConfig::from_file(path)?),
        None => Ok(CompilationConfig::default()),
    }
}

fn print_struct(s: &MessageStruct) {
    println!(
        "  {} struct: fixed {} bytes, max {} bytes{}",
        s.kind(),
        s.fixed_size(),
        s.max_size(),
        if s.has_variable_tail() { ", variable tail" } else { "" }
    );
    for member in s.members() {
        let offset = member
            .offset
            .map_or_else(|| "?".to_string(), |o| o.to_string());
        println!(
            "    @{offset:<5} {:<24} size {:<6} align {}",
            member.kind.to_string(),
            member.size.max_bytes(),
            member.alignment
        );
    }
}

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let sizes = config.sizes();
    let names = DefaultNameProvider;
    let builder = StructLayoutBuilder::new(&sizes, &config);

    match cli.command {
        Commands::Layout { model, interface } => {
            let module = Module::from_file(&model)?;
            let mut layouts = Vec::new();
            for iface in &module.interfaces {
                if interface.as_deref().is_some_and(|name| name != iface.name) {
                    continue;
                }
                for op in &iface.operations {
                    let mut structs = Vec::new();
                    for kind in StructKind::all() {
                        if kind == StructKind::Exception && op.attributes.noexceptions {
                            continue;
                        }
                        structs.push(builder.build(op, kind, Side::Client, true)?);
                    }
                    layouts.push(OperationLayout {
                        interface: &iface.name,
                        operation: &op.name,
                        structs,
                    });
                }
            }

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layouts)?),
                OutputFormat::Text => {
                    for layout in &layouts {
                        println!("{}::{}", layout.interface, layout.operation);
                        for s in &layout.structs {
                            print_struct(s);
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Msgsize { model } => {
            let module = Module::from_file(&model)?;
            let mut assigner = OpcodeAssigner::new(&module, config.interface_number_bits);
            let mut summaries = Vec::new();
            for iface in &module.interfaces {
                for op in &iface.operations {
                    let opcode = assigner.opcode(iface, op)?;
                    let input = builder.build(op, StructKind::In, Side::Client, true)?;
                    let output = builder.build(op, StructKind::Out, Side::Client, true)?;
                    let summary = MsgSizeSummary::new(opcode.value, &input, &output, &sizes);
                    summaries.push((format!("{}::{}", iface.name, op.name), summary));
                }
            }

            match cli.format {
                OutputFormat::Json => {
                    let map: Vec<_> = summaries
                        .iter()
                        .map(|(name, s)| serde_json::json!({ "operation": name, "msgsize": s }))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
                OutputFormat::Text => {
                    for (name, summary) in &summaries {
                        println!("{name} {summary}");
                    }
                }
            }
            Ok(())
        }
        Commands::Plan {
            model,
            interface,
            operation,
            role,
            side,
        } => {
            let module = Module::from_file(&model)?;
            let assembler = StubAssembler::new(builder, &config, &names);
            let plan = match operation {
                Some(operation) => {
                    let (iface, op) = module.operation(&interface, &operation)?;
                    let mut registry = BufferRegistry::new();
                    assembler.assemble(registry.model_for(&iface.name, op), iface, op, role, side)?
                }
                None => {
                    if !role.binds_interface() {
                        return Err(AppError::InterfaceRole(role));
                    }
                    let iface = module.interface(&interface)?;
                    let class = DispatchTableBuilder::new(&module, &assembler).class_buffer(&iface.name)?;
                    assembler.assemble_interface(&class, iface, role, side)?
                }
            };

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                OutputFormat::Text => print!("{plan}"),
            }
            Ok(())
        }
        Commands::Dispatch {
            model,
            interface,
            recover,
        } => {
            let module = Module::from_file(&model)?;
            let assembler = StubAssembler::new(builder, &config, &names);
            let tables = DispatchTableBuilder::new(&module, &assembler);
            let mut registry = BufferRegistry::new();
            let (table, dropped) = if recover {
                tables.build_recovering(&interface, &mut registry)?
            } else {
                (tables.build(&interface, &mut registry)?, Vec::new())
            };

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table)?),
                OutputFormat::Text => print!("{table}"),
            }
            for err in &dropped {
                eprintln!("  Dropped: {}", err);
            }
            Ok(())
        }
    }
}
