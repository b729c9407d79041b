use std::io;

use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use deployer::{
    chain,
    config::{NetworkName, Settings},
    tasks::{self, Task},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let matches = Command::new("IsItMoonYet tasks")
        .version("1.0")
        .about("Read-only inspection tasks for the deployed IsItMoonYet contract")
        .arg(
            Arg::new("network")
                .long("network")
                .help("Network to run against")
                .value_name("NAME")
                .global(true)
                .value_parser(NetworkName::ALL.map(|name| name.as_str()))
                .default_value(NetworkName::default().as_str()),
        )
        .subcommand_required(true)
        .subcommands(Task::ALL.map(|task| Command::new(task.name()).about(task.about())))
        .get_matches();

    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no task given"))?;
    let task: Task = name.parse().map_err(|err: String| anyhow!(err))?;
    let network: NetworkName = sub_matches
        .get_one::<String>("network")
        .or_else(|| matches.get_one::<String>("network"))
        .map(String::as_str)
        .unwrap_or_default()
        .parse()?;

    let settings = Settings::from_env()?;
    let profile = settings.profile(network)?;
    let backend = chain::connect(&profile, &settings.anvil).await?;

    tasks::run(task, &backend, &settings.contract_address_file, &mut io::stdout()).await?;
    Ok(())
}
