use crate::{builtin_kind, ConfigError, MetricKind};
use std::fmt;
use std::str::FromStr;

/// How a series is reduced to a single number before comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `0..=100`, e.g. `p(95)`.
    Percentile(f64),
}

impl Aggregation {
    pub fn supported_by(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Trend => matches!(
                self,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => f.write_str("count"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Aggregation::Count),
            "rate" => Ok(Aggregation::Rate),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or(())?;
                let p: f64 = inner.trim().parse().map_err(|_| ())?;
                if (0.0..=100.0).contains(&p) {
                    Ok(Aggregation::Percentile(p))
                } else {
                    Err(())
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed threshold expression such as `p(95)<300` or `rate>0.999`.
///
/// Trend bounds are in milliseconds; an explicit `ms` or `s` suffix is accepted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl FromStr for ThresholdExpr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let op_start = s.find(['<', '>', '=', '!']).ok_or(())?;
        let (aggregation, rest) = s.split_at(op_start);

        // Two character operators first so `<=` is not read as `<` followed by `=...`.
        let (comparison, bound) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(symbol, cmp)| rest.strip_prefix(symbol).map(|bound| (cmp, bound)))
        .ok_or(())?;

        let bound = if let Some(ms) = bound.strip_suffix("ms") {
            ms.parse::<f64>().map_err(|_| ())?
        } else if let Some(secs) = bound.strip_suffix('s') {
            secs.parse::<f64>().map_err(|_| ())? * 1_000.
        } else {
            bound.parse::<f64>().map_err(|_| ())?
        };

        if !bound.is_finite() {
            return Err(());
        }

        Ok(Self {
            aggregation: aggregation.parse()?,
            comparison,
            bound,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison, self.bound)
    }
}

/// A pass/fail predicate on the final value of a named series.
#[derive(Clone, Debug, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub source: String,
    pub expr: ThresholdExpr,
}

impl Threshold {
    /// Parse `expression` against `metric`. The metric must be a series the engine records and
    /// the aggregation must make sense for its kind.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let expr: ThresholdExpr =
            expression
                .parse()
                .map_err(|_| ConfigError::ThresholdSyntax {
                    metric: metric.to_string(),
                    expression: expression.to_string(),
                })?;

        let kind =
            builtin_kind(metric).ok_or_else(|| ConfigError::UnknownMetric(metric.to_string()))?;

        if !expr.aggregation.supported_by(kind) {
            return Err(ConfigError::UnsupportedAggregation {
                metric: metric.to_string(),
                aggregation: expr.aggregation,
                kind,
            });
        }

        Ok(Self {
            metric: metric.to_string(),
            source: expression.to_string(),
            expr,
        })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.source)
    }
}
