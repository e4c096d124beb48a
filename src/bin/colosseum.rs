//! Tournament runner.
//!
//! Usage: `colosseum <gtn|dnb> <matches> <bot command>...`
//!
//! Each bot command is one argument, e.g. `"./target/release/dnb-random-bot 42"`.
//! Hosting behaviors and limits are read from the environment, see
//! [`Configuration::from_env`] and [`LimitsBuilder::from_env`].

use anyhow::{bail, Context};
use colosseum::{
    games::{
        dots_and_boxes::{DnbSettings, DotsAndBoxes},
        guess_the_number::{GtnSettings, GuessTheNumber},
    },
    prelude::*,
};

fn run<G: Game>(
    game: G,
    settings: G::Settings,
    matches: usize,
    bots: Vec<BotSpec>,
) -> anyhow::Result<()> {
    let config = Configuration::from_env();
    let limits = LimitsBuilder::from_env().build()?;
    let mut hoster = GameHoster::new(game, bots, config, limits)?;

    for _ in 0..matches {
        hoster.start_game(&settings)?;
    }
    hoster.shutdown();

    println!("\nRanking after {} matches:", hoster.games_played());
    for (rank, (name, avg)) in hoster.ranking().into_iter().enumerate() {
        println!("{:>3}. {name}: {avg:.3}", rank + 1);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let usage = "usage: colosseum <gtn|dnb> <matches> <bot command>...";
    let game = args.next().context(usage)?;
    let matches = args
        .next()
        .context(usage)?
        .parse::<usize>()
        .context("<matches> must be a number")?;
    let bots = args
        .map(|command| BotSpec::parse(None, &command))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if bots.is_empty() {
        bail!(usage);
    }

    match game.as_str() {
        "gtn" => run(GuessTheNumber::new(), GtnSettings::default(), matches, bots),
        "dnb" => run(DotsAndBoxes::new(), DnbSettings::default(), matches, bots),
        other => bail!("unknown game '{other}', expected gtn or dnb"),
    }
}
