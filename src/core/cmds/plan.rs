use crate::core::campaign::Campaign;
use crate::core::cli::RunArgs;
use crate::core::cmdfile::render_command_file;
use crate::core::cmds::run::build_settings;
use crate::types::AppResult;
use crate::types::config::config;

/// Print the workers a campaign would start, in command file format
pub async fn execute_plan(args: RunArgs) -> AppResult<()> {
    let settings = build_settings(config(), args)?;
    let campaign = Campaign::new(settings);
    let plans = campaign.plan_workers()?;

    let text = render_command_file(
        plans
            .iter()
            .map(|p| (p.name.as_str(), p.env.as_slice(), p.argv.as_slice())),
    );
    print!("{text}");
    Ok(())
}
