use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use log::info;

use crat_checker::{parse_weights, CheckSummary, Checker, RuleCounters};
use crat_dimacs::DimacsParser;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// The input CNF formula to check the proof against.
    #[arg(short = 'i', long = "input", value_name = "FILE.cnf")]
    input: PathBuf,

    /// The CRAT proof file to check.
    #[arg(short = 'p', long = "proof", value_name = "FILE.crat")]
    proof: PathBuf,

    /// Print more helpful diagnostic information if there is an error.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Colon-separated set of input weights, one percentage (0..=100) per variable in order.
    #[arg(short = 'w', long = "weights", value_name = "W1:W2:...:Wn")]
    weights: Option<String>,
}

pub fn check_main(args: CheckArgs) -> anyhow::Result<i32> {
    let weights = match &args.weights {
        Some(spec) => Some(
            parse_weights(spec)
                .map_err(|msg| anyhow::anyhow!("couldn't extract weights from '{}': {}", spec, msg))?,
        ),
        None => None,
    };

    info!("Reading CNF file '{}'", args.input.display());
    let cnf_file = File::open(&args.input)?;
    let formula = match DimacsParser::parse(BufReader::new(cnf_file)) {
        Ok(formula) => formula,
        Err(err) => {
            println!("Error reading CNF file: {}", err);
            println!("PROOF FAILED");
            return Ok(1);
        }
    };
    let mut checker = match Checker::from_formula_verbose(&formula, args.verbose) {
        Ok(checker) => checker,
        Err(err) => {
            println!("Error reading CNF file: {}", err);
            println!("PROOF FAILED");
            return Ok(1);
        }
    };

    info!("Checking proof file '{}'", args.proof.display());
    let proof_file = File::open(&args.proof)?;

    let start = Instant::now();
    let result = checker.check_proof(BufReader::new(proof_file));
    let elapsed = start.elapsed();

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            println!("PROOF FAILED: {}", err);
            return Ok(1);
        }
    };

    println!("Root node {}", summary.root);
    if summary.fully_hinted() {
        println!("PROOF SUCCESSFUL");
    } else {
        println!("PROOF PARTIALLY VERIFIED");
    }
    print_summary(&summary);

    println!("Elapsed time for check: {:.2} seconds", elapsed.as_secs_f64());

    let empty_weights = Default::default();
    let count = checker.count(weights.as_ref().unwrap_or(&empty_weights));
    if weights.is_some() {
        println!("Weighted count = {:.5}", count);
    } else {
        println!("Unweighted count = {:.0}", count);
    }

    Ok(0)
}

fn print_summary(summary: &CheckSummary) {
    println!("{} total clauses", summary.total_clause_count);
    println!("{} maximum live clauses", summary.max_live_clause_count);
    println!("Command occurences:");
    let mut total = 0u64;
    for (cmd, count) in rule_counts(&summary.rule_counters) {
        if count > 0 {
            total += count;
            println!("    {:>2}   : {}", cmd, count);
        }
    }
    println!("    TOTAL: {}", total);
}

/// The CRAT directive commands, sorted alphabetically as the prototype's `summarize` does.
fn rule_counts(counters: &RuleCounters) -> Vec<(&'static str, u64)> {
    vec![
        ("a", counters.add_rup),
        ("dc", counters.delete_rup),
        ("do", counters.delete_operation),
        ("i", counters.input),
        ("p", counters.product),
        ("s", counters.sum),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn checks_a_minimal_valid_proof_end_to_end() {
        let cnf = write_file("p cnf 2 2\n1 0\n2 0\n");
        let proof = write_file("1 i 1 0\n2 i 2 0\n3 p 3 1 2\n6 a 3 0 1 2 3 0\ndc 1 6 4 0\ndc 2 6 5 0\ndo 3\n");

        let args = CheckArgs {
            input: cnf.path().to_path_buf(),
            proof: proof.path().to_path_buf(),
            verbose: false,
            weights: None,
        };
        assert_eq!(check_main(args).unwrap(), 0);
    }

    #[test]
    fn reports_failure_for_an_invalid_proof() {
        let cnf = write_file("p cnf 1 1\n1 0\n");
        let proof = write_file("1 i -1 0\n");

        let args = CheckArgs {
            input: cnf.path().to_path_buf(),
            proof: proof.path().to_path_buf(),
            verbose: false,
            weights: None,
        };
        assert_eq!(check_main(args).unwrap(), 1);
    }
}
