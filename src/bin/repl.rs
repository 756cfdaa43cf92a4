use clap::Parser;
use dice_formula::common::Denomination;
use dice_formula::{BreakdownStringifier, EvaluateOptions, Roll, RollContext, Stringify};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const MANUAL_METHOD: &str = "manual";

/// Roll dice formulas interactively.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Denominations whose results are typed in by hand, e.g. `--manual d20`.
    #[arg(long, value_parser = parse_denomination)]
    manual: Vec<Denomination>,
    /// Seed for the random number generator.
    #[arg(long)]
    seed: Option<u64>,
    /// Show only the total instead of the breakdown.
    #[arg(long, short)]
    quiet: bool,
}

fn parse_denomination(s: &str) -> Result<Denomination, String> {
    s.strip_prefix(|c: char| c == 'd' || c == 'D')
        .ok_or_else(|| format!("{:?} does not start with 'd'", s))?
        .parse()
}

type Input = Lines<BufReader<Stdin>>;

fn prompt(s: &str) -> io::Result<()> {
    print!("{}", s);
    io::stdout().flush()
}

async fn roll_line(
    line: &str,
    ctx: &mut RollContext<StdRng>,
    input: &mut Input,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut roll = Roll::new(line)?;
    let coordinator = roll.coordinator().clone();
    let total = {
        let evaluation = roll.evaluate(ctx, EvaluateOptions::default());
        tokio::pin!(evaluation);
        loop {
            tokio::select! {
                total = &mut evaluation => break total?,
                Some(request) = coordinator.next_request() => {
                    prompt(&format!("{} = ", request.denomination))?;
                    let answer = match input.next_line().await? {
                        Some(answer) => answer,
                        None => {
                            coordinator.cancel();
                            continue;
                        }
                    };
                    match answer.trim().parse() {
                        Ok(value) => {
                            if !coordinator.register_result(&request.method, &request.denomination.to_string(), value) {
                                eprintln!("{} cannot roll {}", request.denomination, value);
                            }
                        }
                        Err(why) => eprintln!("Error: {}", why),
                    }
                }
            }
        }
    };

    if quiet {
        println!("{}", total);
    } else {
        println!("{}", BreakdownStringifier::new().stringify(&roll)?);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut ctx = RollContext::with_roller(rng);
    for denomination in &args.manual {
        ctx.config_mut().fulfillment.assign(*denomination, MANUAL_METHOD, true);
    }

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(async {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        prompt("> ")?;
        while let Some(line) = input.next_line().await? {
            let line = line.trim();
            if !line.is_empty() {
                if let Err(why) = roll_line(line, &mut ctx, &mut input, args.quiet).await {
                    eprintln!("Error: {}", why);
                }
            }
            prompt("> ")?;
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
