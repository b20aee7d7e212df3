//! Trace expectation DSL
//!
//! A case is written as `method[(args)]: points [=> Type]`:
//!
//! ```text
//! simpleIf: !1 3 4
//! simpleTryCatch: 1 2 3!FirstException 4 5!SecondException => SecondException
//! branch(false): 2
//! ```
//!
//! Each point is `id` (the trace call returns true), `!id` (returns false)
//! or `id!Type` (throws a new `Type`). Points a branch makes unreachable are
//! left out, so the list is exactly the sequence the method should record.
//! Exception names without a package name a flow class when one exists and
//! `java.lang` otherwise.

use crate::program::qualify_exception;
use crate::{FlowError, FlowResult};
use std::fmt;

/// What a trace call does once its id has been recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Pass,
    Fail,
    /// Throw a new instance of the named class
    Throw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePoint {
    pub id: i32,
    pub action: Action,
}

impl fmt::Display for TracePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Action::Pass => write!(f, "{}", self.id),
            Action::Fail => write!(f, "!{}", self.id),
            Action::Throw(class) => write!(f, "{}!{}", self.id, simple_name(class)),
        }
    }
}

/// How the invoked method is expected to finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Return,
    Throws(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Return => f.write_str("returns"),
            Outcome::Throws(class) => write!(f, "throws {}", class),
        }
    }
}

/// One named conformance case
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCase {
    pub name: String,
    pub method: String,
    pub args: Vec<bool>,
    pub points: Vec<TracePoint>,
    pub outcome: Outcome,
}

impl FlowCase {
    pub fn parse(name: &str, text: &str) -> FlowResult<Self> {
        let err = |message: String| FlowError::Dsl {
            case: name.to_string(),
            message,
        };

        let (head, body) = text
            .split_once(':')
            .ok_or_else(|| err("missing `:` after the method".to_string()))?;
        let (method, args) = parse_call(head.trim()).map_err(err)?;

        let (points, outcome) = match body.split_once("=>") {
            Some((points, class)) => {
                let class = class.trim();
                if class.is_empty() || class.contains(char::is_whitespace) {
                    return Err(err(format!("invalid exception type `{}`", class)));
                }
                (points, Outcome::Throws(qualify_exception(class)))
            }
            None => (body, Outcome::Return),
        };
        let points = points
            .split_whitespace()
            .map(parse_point)
            .collect::<Result<Vec<_>, _>>()
            .map_err(err)?;

        Ok(Self {
            name: name.to_string(),
            method,
            args,
            points,
            outcome,
        })
    }

    /// Ids the method must record, in order
    pub fn expected_trace(&self) -> Vec<i32> {
        self.points.iter().map(|point| point.id).collect()
    }
}

impl fmt::Display for FlowCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)?;
        if !self.args.is_empty() {
            let args = self
                .args
                .iter()
                .map(bool::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "({})", args)?;
        }
        f.write_str(":")?;
        for point in &self.points {
            write!(f, " {}", point)?;
        }
        if let Outcome::Throws(class) = &self.outcome {
            write!(f, " => {}", simple_name(class))?;
        }
        Ok(())
    }
}

fn simple_name(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

fn parse_call(head: &str) -> Result<(String, Vec<bool>), String> {
    let (method, args) = match head.split_once('(') {
        Some((method, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| format!("unclosed argument list in `{}`", head))?;
            let args = inner
                .split(',')
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(|arg| match arg {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    other => Err(format!("argument `{}` is not a boolean", other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            (method.trim(), args)
        }
        None => (head, Vec::new()),
    };

    let valid = method
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("invalid method name `{}`", method));
    }
    Ok((method.to_string(), args))
}

fn parse_point(token: &str) -> Result<TracePoint, String> {
    let id = |text: &str| {
        text.parse::<i32>()
            .map_err(|_| format!("invalid trace point `{}`", token))
    };

    if let Some(rest) = token.strip_prefix('!') {
        return Ok(TracePoint {
            id: id(rest)?,
            action: Action::Fail,
        });
    }
    match token.split_once('!') {
        Some((_, "")) => Err(format!("missing exception type in `{}`", token)),
        Some((point, class)) => Ok(TracePoint {
            id: id(point)?,
            action: Action::Throw(qualify_exception(class)),
        }),
        None => Ok(TracePoint {
            id: id(token)?,
            action: Action::Pass,
        }),
    }
}
