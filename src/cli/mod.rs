use crate::app::App;
use crate::config::RuntimeConfig;
use crate::keeper::AddressResolver;
use crate::runtime::ProcessRuntime;
use crate::types::{
    AnyMsg, GenesisState, MsgCreateNewScript, MsgExec, MsgUpdateScript, QueryParamsRequest,
    QueryScriptInfoRequest, QueryWebRequest,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "script-runtime")]
#[command(about = "Versioned scripts executed by an external interpreter", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Runtime config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Interpreter program, overriding the config file
    #[arg(long, global = true)]
    pub interpreter: Option<String>,

    /// Interpreter wall-clock timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an empty genesis file and, optionally, the default config
    Init {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        config_out: Option<String>,
    },

    /// Execute a script function
    Exec {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        executor: String,

        #[arg(long)]
        script: String,

        #[arg(long, default_value = "")]
        function: String,

        #[arg(long, default_value = "")]
        args: String,

        #[arg(long, default_value = "")]
        kwargs: String,

        #[arg(long, default_value = "")]
        extra_code: String,

        /// JSON file holding an array of messages to dispatch first
        #[arg(long)]
        attached: Option<String>,

        #[arg(long, default_value = "10000000")]
        gas_limit: u64,

        #[arg(long, default_value = "1")]
        height: i64,

        /// Print the result without saving state
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace the code of the script at an address
    Update {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        address: String,

        #[arg(long)]
        code_file: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Store code under a new derived script address
    Create {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        creator: String,

        #[arg(long)]
        code_file: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Run a script in web mode
    Web {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        address: String,

        #[arg(long, default_value = "")]
        request: String,
    },

    /// Show a stored script
    Info {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,

        #[arg(long)]
        address: String,
    },

    /// Show the module params
    Params {
        #[arg(long, default_value = "genesis.json")]
        genesis: String,
    },
}

pub fn handle_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init { genesis, config_out } => handle_init(&config, &genesis, config_out.as_deref()),

        Commands::Exec {
            genesis,
            executor,
            script,
            function,
            args,
            kwargs,
            extra_code,
            attached,
            gas_limit,
            height,
            dry_run,
        } => {
            let attached_messages = match attached {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => Vec::new(),
            };
            let msg = MsgExec {
                executor_address: executor,
                script_address: script,
                extra_code,
                function_name: function,
                args,
                kwargs,
                attached_messages,
            };
            handle_exec(config, &genesis, msg, gas_limit, height, dry_run)
        }

        Commands::Update {
            genesis,
            address,
            code_file,
            dry_run,
        } => {
            let msg = MsgUpdateScript {
                address: address.clone(),
                code: std::fs::read_to_string(code_file)?,
            };
            deliver_and_save(config, &genesis, &address, AnyMsg::pack(&msg)?, dry_run)
        }

        Commands::Create {
            genesis,
            creator,
            code_file,
            dry_run,
        } => {
            let msg = MsgCreateNewScript {
                creator_address: creator.clone(),
                code: std::fs::read_to_string(code_file)?,
            };
            deliver_and_save(config, &genesis, &creator, AnyMsg::pack(&msg)?, dry_run)
        }

        Commands::Web {
            genesis,
            address,
            request,
        } => handle_query(
            config,
            &genesis,
            AnyMsg::pack(&QueryWebRequest {
                address_or_name: address,
                httprequest: request,
            })?,
        ),

        Commands::Info { genesis, address } => handle_query(
            config,
            &genesis,
            AnyMsg::pack(&QueryScriptInfoRequest { address })?,
        ),

        Commands::Params { genesis } => handle_query(config, &genesis, AnyMsg::pack(&QueryParamsRequest {})?),
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(program) = &cli.interpreter {
        config.interpreter.program = program.clone();
    }
    if let Some(timeout) = cli.timeout_secs {
        config.interpreter.timeout_secs = Some(timeout);
    }
    config.validate()?;
    Ok(config)
}

fn open_app(config: RuntimeConfig, genesis_path: &str, height: i64) -> Result<App, Box<dyn std::error::Error>> {
    let genesis: GenesisState = if Path::new(genesis_path).exists() {
        serde_json::from_str(&std::fs::read_to_string(genesis_path)?)?
    } else {
        info!("{} not found, starting from an empty genesis", genesis_path);
        GenesisState::default()
    };

    let runtime = Arc::new(ProcessRuntime::new(config.interpreter.clone()));
    let mut app = App::new(config, runtime, Arc::new(AddressResolver))?;
    app.init_genesis(&genesis)?;
    app.begin_block(height, Utc::now())?;
    Ok(app)
}

fn save_genesis(app: &App, genesis_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(&app.export_genesis()?)?;
    std::fs::write(genesis_path, json)?;
    info!("Saved state to {}", genesis_path);
    Ok(())
}

fn handle_init(
    config: &RuntimeConfig,
    genesis_path: &str,
    config_out: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(&GenesisState::default())?;
    std::fs::write(genesis_path, json)?;
    info!("Wrote empty genesis to {}", genesis_path);

    if let Some(path) = config_out {
        std::fs::write(path, config.to_toml()?)?;
        info!("Wrote config to {}", path);
    }
    Ok(())
}

fn handle_exec(
    config: RuntimeConfig,
    genesis_path: &str,
    msg: MsgExec,
    gas_limit: u64,
    height: i64,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = open_app(config, genesis_path, height)?;
    let executor = msg.executor_address.clone();

    let start = Instant::now();
    let tx = app.deliver(&executor, &AnyMsg::pack(&msg)?, gas_limit)?;
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    info!(
        "Executed {} in {:.2} ms, {} gas, {} events",
        msg.script_address,
        elapsed,
        tx.gas_used,
        tx.events.len()
    );
    println!("{}", serde_json::to_string_pretty(&tx.response)?);

    if !dry_run {
        app.commit();
        save_genesis(&app, genesis_path)?;
    }
    Ok(())
}

fn deliver_and_save(
    config: RuntimeConfig,
    genesis_path: &str,
    signer: &str,
    msg: AnyMsg,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = open_app(config, genesis_path, 1)?;
    let tx = app.deliver(signer, &msg, u64::MAX)?;
    println!("{}", serde_json::to_string_pretty(&tx.response)?);

    if !dry_run {
        app.commit();
        save_genesis(&app, genesis_path)?;
    }
    Ok(())
}

fn handle_query(config: RuntimeConfig, genesis_path: &str, request: AnyMsg) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = open_app(config, genesis_path, 1)?;
    let response = app.query(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec_command() {
        let cli = Cli::try_parse_from([
            "script-runtime",
            "--timeout-secs",
            "5",
            "exec",
            "--executor",
            "dys1aa",
            "--script",
            "dys1bb",
            "--function",
            "main",
        ])
        .unwrap();

        assert_eq!(cli.timeout_secs, Some(5));
        match cli.command {
            Commands::Exec {
                genesis,
                function,
                gas_limit,
                dry_run,
                ..
            } => {
                assert_eq!(genesis, "genesis.json");
                assert_eq!(function, "main");
                assert_eq!(gas_limit, 10_000_000);
                assert!(!dry_run);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_load_config_overrides() {
        let cli = Cli::try_parse_from(["script-runtime", "--interpreter", "/opt/dys", "params"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.interpreter.program, "/opt/dys");
        assert_eq!(config.interpreter.timeout_secs, None);
    }

    #[test]
    fn test_update_then_info_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = dir.path().join("genesis.json");
        let genesis = genesis.to_str().unwrap();
        let code = dir.path().join("a.dys");
        std::fs::write(&code, "x=1").unwrap();

        let address = RuntimeConfig::default().address_codec().encode(&[0xaa; 20]);
        let cli = Cli::try_parse_from([
            "script-runtime",
            "update",
            "--genesis",
            genesis,
            "--address",
            &address,
            "--code-file",
            code.to_str().unwrap(),
        ])
        .unwrap();
        handle_command(cli).unwrap();

        let saved: GenesisState = serde_json::from_str(&std::fs::read_to_string(genesis).unwrap()).unwrap();
        assert_eq!(saved.scripts.len(), 1);
        assert_eq!(saved.scripts[0].version, 1);
    }
}
