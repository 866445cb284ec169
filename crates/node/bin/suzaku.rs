use clap::Args;
use clap::Parser;
use clap::Subcommand;
use suzaku_node::config::Config;
use suzaku_node::config::DEFAULT_CONFIG_LOCATION;
use suzaku_node::logging::init_logging;
use suzaku_node::logging::LogLevel;
use suzaku_node::simulation::Simulation;
use suzaku_node::util::build_version;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(
        about = "Runs a ring of simulated nodes on an in-process network, crashes some of them and measures lookups."
    )]
    Simulate(SimulateCommand),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = DEFAULT_CONFIG_LOCATION,
        help = "Config file location"
    )]
    pub config: String,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = DEFAULT_CONFIG_LOCATION,
        help = "The location of config file"
    )]
    pub location: String,
}

#[derive(Args, Debug)]
struct SimulateCommand {
    #[command(flatten)]
    config_args: ConfigArgs,

    #[arg(long, help = "Number of nodes. If not provided, use simulation.nodes in config file")]
    pub nodes: Option<usize>,

    #[arg(
        long,
        help = "Number of random lookups. If not provided, use simulation.lookups in config file"
    )]
    pub lookups: Option<usize>,

    #[arg(
        long,
        help = "Number of nodes to crash. If not provided, use simulation.failures in config file"
    )]
    pub failures: Option<usize>,

    #[arg(
        long,
        help = "Update rounds before crashing nodes. If not provided, use simulation.rounds in config file"
    )]
    pub rounds: Option<usize>,

    #[arg(long, help = "Print every surviving node as JSON")]
    pub inspect: bool,
}

impl SimulateCommand {
    fn load(&self) -> anyhow::Result<Config> {
        let mut config = Config::read_fs(&self.config_args.config)?;
        let sim = &mut config.simulation;
        if let Some(nodes) = self.nodes {
            sim.nodes = nodes;
        }
        if let Some(lookups) = self.lookups {
            sim.lookups = lookups;
        }
        if let Some(failures) = self.failures {
            sim.failures = failures;
        }
        if let Some(rounds) = self.rounds {
            sim.rounds = rounds;
        }
        config.validate()?;
        Ok(config)
    }
}

async fn simulate(args: SimulateCommand) -> anyhow::Result<()> {
    let config = args.load()?;
    let (sim, report) = Simulation::run(&config).await?;
    if args.inspect {
        println!("{}", serde_json::to_string_pretty(&sim.inspect()?)?);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    sim.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    tracing::debug!("suzaku {}", build_version());

    match cli.command {
        Command::Init(args) => {
            let path = Config::default().write_fs(&args.location)?;
            println!("Your config file has saved to: {}", path);
            Ok(())
        }
        Command::Simulate(args) => simulate(args).await,
    }
}
