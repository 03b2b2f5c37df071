//! Textual encoding of CRAT proof directives.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crat_formula::{Lit, Var};

use crate::{Hints, Id, ProofStep};

/// Errors produced while parsing a CRAT proof directive.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("line {}: looking for clause id, got '{}'", line, token)]
    ExpectedId { line: usize, token: String },
    #[error("line {}: non-integer value '{}' encountered", line, token)]
    NonInteger { line: usize, token: String },
    #[error("line {}: no terminating 0 found", line)]
    MissingTerminator { line: usize },
    #[error("line {}: items beyond terminating 0", line)]
    TrailingTokens { line: usize },
    #[error("line {}: invalid command '{}'", line, command)]
    InvalidCommand { line: usize, command: String },
    #[error("line {}: invalid number of operands for '{}'", line, command)]
    WrongOperandCount { line: usize, command: &'static str },
    #[error("line {}: clause given for 'i' is tautological", line)]
    TautologicalInputClause { line: usize },
    #[error("line {}: clause given for 'a' is tautological", line)]
    TautologicalAddedClause { line: usize },
    #[error("line {}: missing output variable for operation deletion", line)]
    MissingOutputVariable { line: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads CRAT proof directives, one per non-comment, non-blank line.
pub struct ProofReader<R> {
    lines: io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> ProofReader<R> {
    pub fn new(source: R) -> Self {
        ProofReader {
            lines: source.lines(),
            line_number: 0,
        }
    }

    /// Reads and parses the next non-comment, non-blank directive.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_step(&mut self) -> Result<Option<(usize, ProofStep)>, ProofError> {
        loop {
            let line = match self.lines.next() {
                None => return Ok(None),
                Some(line) => line?,
            };
            self.line_number += 1;

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() || tokens[0].starts_with('c') {
                continue;
            }

            let step = parse_directive(self.line_number, &tokens)?;
            return Ok(Some((self.line_number, step)));
        }
    }
}

impl<R: BufRead> Iterator for ProofReader<R> {
    type Item = Result<(usize, ProofStep), ProofError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_step().transpose()
    }
}

fn parse_directive(line: usize, tokens: &[&str]) -> Result<ProofStep, ProofError> {
    let (id, rest): (Option<Id>, &[&str]) = if tokens[0] == "dc" || tokens[0] == "do" {
        (None, tokens)
    } else {
        let id = parse_id(line, tokens[0])?;
        (Some(id), &tokens[1..])
    };

    if rest.is_empty() {
        return Err(ProofError::ExpectedId {
            line,
            token: String::new(),
        });
    }

    let command = rest[0];
    let rest = &rest[1..];

    match command {
        "i" => {
            let (lits, rest) = find_literals(line, rest)?;
            require_no_trailing(line, rest)?;
            let clause = crat_formula::clean_clause(&lits)
                .ok_or(ProofError::TautologicalInputClause { line })?;
            Ok(ProofStep::Input {
                id: id.expect("'i' directives carry a leading id"),
                clause,
            })
        }
        "a" => {
            let (lits, rest) = find_literals(line, rest)?;
            let (hints, rest) = find_hints(line, rest)?;
            require_no_trailing(line, rest)?;
            let clause = crat_formula::clean_clause(&lits)
                .ok_or(ProofError::TautologicalAddedClause { line })?;
            Ok(ProofStep::AddRup {
                id: id.expect("'a' directives carry a leading id"),
                clause,
                hints,
            })
        }
        "dc" => {
            if rest.is_empty() {
                return Err(ProofError::WrongOperandCount { line, command: "dc" });
            }
            let deleted_id = parse_id(line, rest[0])?;
            let (hints, rest) = find_hints(line, &rest[1..])?;
            require_no_trailing(line, rest)?;
            Ok(ProofStep::DeleteRup {
                id: deleted_id,
                hints,
            })
        }
        "p" => {
            if rest.len() != 3 {
                return Err(ProofError::WrongOperandCount { line, command: "p" });
            }
            let out_var = parse_var(line, rest[0])?;
            let left = parse_lit(line, rest[1])?;
            let right = parse_lit(line, rest[2])?;
            Ok(ProofStep::Product {
                id: id.expect("'p' directives carry a leading id"),
                out_var,
                left,
                right,
            })
        }
        "s" => {
            if rest.len() < 3 {
                return Err(ProofError::WrongOperandCount { line, command: "s" });
            }
            let out_var = parse_var(line, rest[0])?;
            let left = parse_lit(line, rest[1])?;
            let right = parse_lit(line, rest[2])?;
            let (hints, rest) = find_hints(line, &rest[3..])?;
            require_no_trailing(line, rest)?;
            Ok(ProofStep::Sum {
                id: id.expect("'s' directives carry a leading id"),
                out_var,
                left,
                right,
                hints,
            })
        }
        "do" => {
            if rest.len() != 1 {
                return Err(ProofError::MissingOutputVariable { line });
            }
            let out_var = parse_var(line, rest[0])?;
            Ok(ProofStep::DeleteOperation { out_var })
        }
        other => Err(ProofError::InvalidCommand {
            line,
            command: other.to_owned(),
        }),
    }
}

fn parse_id(line: usize, token: &str) -> Result<Id, ProofError> {
    token.parse().map_err(|_| ProofError::NonInteger {
        line,
        token: token.to_owned(),
    })
}

fn parse_dimacs(line: usize, token: &str) -> Result<isize, ProofError> {
    token.parse().map_err(|_| ProofError::NonInteger {
        line,
        token: token.to_owned(),
    })
}

fn parse_lit(line: usize, token: &str) -> Result<Lit, ProofError> {
    Ok(Lit::from_dimacs(parse_dimacs(line, token)?))
}

fn parse_var(line: usize, token: &str) -> Result<Var, ProofError> {
    let number = parse_dimacs(line, token)?;
    if number <= 0 {
        return Err(ProofError::NonInteger {
            line,
            token: token.to_owned(),
        });
    }
    Ok(Var::from_dimacs(number))
}

/// Reads a zero-terminated list of literals.
fn find_literals<'a>(line: usize, tokens: &'a [&'a str]) -> Result<(Vec<Lit>, &'a [&'a str]), ProofError> {
    let mut lits = Vec::new();
    let mut rest = tokens;
    loop {
        let token = *rest.first().ok_or(ProofError::MissingTerminator { line })?;
        rest = &rest[1..];
        let number = parse_dimacs(line, token)?;
        if number == 0 {
            return Ok((lits, rest));
        }
        lits.push(Lit::from_dimacs(number));
    }
}

/// Reads a zero-terminated hint list, which may be replaced by a single `*`.
fn find_hints<'a>(line: usize, tokens: &'a [&'a str]) -> Result<(Hints, &'a [&'a str]), ProofError> {
    if let Some(&"*") = tokens.first() {
        let rest = &tokens[1..];
        let terminator = *rest.first().ok_or(ProofError::MissingTerminator { line })?;
        if parse_dimacs(line, terminator)? != 0 {
            return Err(ProofError::TrailingTokens { line });
        }
        return Ok((Hints::Unhinted, &rest[1..]));
    }

    let mut ids = Vec::new();
    let mut rest = tokens;
    loop {
        let token = *rest.first().ok_or(ProofError::MissingTerminator { line })?;
        rest = &rest[1..];
        let number = parse_id(line, token)?;
        if number == 0 {
            return Ok((Hints::Clauses(ids), rest));
        }
        ids.push(number);
    }
}

fn require_no_trailing(line: usize, rest: &[&str]) -> Result<(), ProofError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ProofError::TrailingTokens { line })
    }
}

/// Writes a single CRAT proof directive.
pub fn write_step(target: &mut impl Write, step: &ProofStep) -> io::Result<()> {
    match step {
        ProofStep::Input { id, clause } => {
            write!(target, "{} i", id)?;
            write_literals(target, clause)?;
        }
        ProofStep::AddRup { id, clause, hints } => {
            write!(target, "{} a", id)?;
            write_literals(target, clause)?;
            write_hints(target, hints)?;
        }
        ProofStep::DeleteRup { id, hints } => {
            write!(target, "dc {}", id)?;
            write_hints(target, hints)?;
        }
        ProofStep::Product {
            id,
            out_var,
            left,
            right,
        } => {
            writeln!(
                target,
                "{} p {} {} {}",
                id,
                out_var.to_dimacs(),
                left.to_dimacs(),
                right.to_dimacs()
            )?;
        }
        ProofStep::Sum {
            id,
            out_var,
            left,
            right,
            hints,
        } => {
            write!(
                target,
                "{} s {} {} {}",
                id,
                out_var.to_dimacs(),
                left.to_dimacs(),
                right.to_dimacs()
            )?;
            write_hints(target, hints)?;
        }
        ProofStep::DeleteOperation { out_var } => {
            writeln!(target, "do {}", out_var.to_dimacs())?;
        }
    }
    Ok(())
}

fn write_literals(target: &mut impl Write, lits: &[Lit]) -> io::Result<()> {
    for lit in lits {
        write!(target, " {}", lit.to_dimacs())?;
    }
    writeln!(target, " 0")
}

fn write_hints(target: &mut impl Write, hints: &Hints) -> io::Result<()> {
    match hints {
        Hints::Unhinted => writeln!(target, " * 0"),
        Hints::Clauses(ids) => {
            for id in ids {
                write!(target, " {}", id)?;
            }
            writeln!(target, " 0")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> ProofStep {
        let mut reader = ProofReader::new(text.as_bytes());
        reader.next_step().unwrap().unwrap().1
    }

    #[test]
    fn parses_input_directive() {
        let step = parse_one("1 i -2 3 0\n");
        assert_eq!(
            step,
            ProofStep::Input {
                id: 1,
                clause: vec![Lit::from_dimacs(3), Lit::from_dimacs(-2)],
            }
        );
    }

    #[test]
    fn parses_add_rup_with_explicit_hints() {
        let step = parse_one("4 a 1 -2 0 1 2 3 0\n");
        assert_eq!(
            step,
            ProofStep::AddRup {
                id: 4,
                clause: vec![Lit::from_dimacs(-2), Lit::from_dimacs(1)],
                hints: Hints::Clauses(vec![1, 2, 3]),
            }
        );
    }

    #[test]
    fn parses_add_rup_with_star_hint() {
        let step = parse_one("4 a 1 0 * 0\n");
        assert_eq!(
            step,
            ProofStep::AddRup {
                id: 4,
                clause: vec![Lit::from_dimacs(1)],
                hints: Hints::Unhinted,
            }
        );
    }

    #[test]
    fn parses_product_and_sum() {
        assert_eq!(
            parse_one("10 p 5 1 2\n"),
            ProofStep::Product {
                id: 10,
                out_var: Var::from_dimacs(5),
                left: Lit::from_dimacs(1),
                right: Lit::from_dimacs(2),
            }
        );

        assert_eq!(
            parse_one("11 s 6 1 2 7 8 0\n"),
            ProofStep::Sum {
                id: 11,
                out_var: Var::from_dimacs(6),
                left: Lit::from_dimacs(1),
                right: Lit::from_dimacs(2),
                hints: Hints::Clauses(vec![7, 8]),
            }
        );
    }

    #[test]
    fn parses_deletions() {
        assert_eq!(
            parse_one("dc 4 1 2 0\n"),
            ProofStep::DeleteRup {
                id: 4,
                hints: Hints::Clauses(vec![1, 2]),
            }
        );
        assert_eq!(
            parse_one("do 6\n"),
            ProofStep::DeleteOperation {
                out_var: Var::from_dimacs(6),
            }
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut reader = ProofReader::new("c a comment\n\n1 i 1 0\n".as_bytes());
        let (line, step) = reader.next_step().unwrap().unwrap();
        assert_eq!(line, 3);
        assert_eq!(
            step,
            ProofStep::Input {
                id: 1,
                clause: vec![Lit::from_dimacs(1)],
            }
        );
        assert!(reader.next_step().unwrap().is_none());
    }

    #[test]
    fn rejects_invalid_command() {
        let mut reader = ProofReader::new("1 z 0\n".as_bytes());
        match reader.next_step() {
            Err(ProofError::InvalidCommand { .. }) => (),
            other => panic!("expected InvalidCommand, got {:?}", other),
        }
    }

    #[test]
    fn roundtrips_through_writer() {
        let step = ProofStep::Sum {
            id: 3,
            out_var: Var::from_dimacs(9),
            left: Lit::from_dimacs(4),
            right: Lit::from_dimacs(-5),
            hints: Hints::Unhinted,
        };

        let mut buf = Vec::new();
        write_step(&mut buf, &step).unwrap();

        let mut reader = ProofReader::new(&buf[..]);
        let (_, parsed) = reader.next_step().unwrap().unwrap();
        assert_eq!(parsed, step);
    }
}
