use serde_derive::{Deserialize, Serialize};

use crate::event::Fields;
use crate::hist::Axis;

/// Arithmetic over named fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Field(String),
    Constant(f64),
    Scaled(Box<Expr>, f64),
    Difference(Box<Expr>, Box<Expr>),
    Ratio(Box<Expr>, Box<Expr>),
    /// Euclidean norm of the given terms
    Norm(Vec<Expr>)
}

impl Expr {
    pub fn field(name: &str) -> Self {
        Expr::Field(name.to_owned())
    }

    /// `None` when a field is missing
    pub fn eval<F: Fields>(&self, row: &F) -> Option<f64> {
        match self {
            Expr::Field(name) => row.field(name),
            Expr::Constant(c) => Some(*c),
            Expr::Scaled(e, s) => e.eval(row).map(|v| v * s),
            Expr::Difference(a, b) => Some(a.eval(row)? - b.eval(row)?),
            Expr::Ratio(a, b) => Some(a.eval(row)? / b.eval(row)?),
            Expr::Norm(terms) => {
                let mut sum = 0.0;
                for t in terms {
                    let v = t.eval(row)?;
                    sum += v * v;
                }
                Some(sum.sqrt())
            }
        }
    }
}

fn delta(reco: &str, truth: &str) -> Expr {
    Expr::Difference(Box::new(Expr::field(reco)), Box::new(Expr::field(truth)))
}

/// A quantity to histogram, with its binning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub axis: Axis,
    pub expr: Expr
}

impl Variable {
    pub fn new(name: &str, axis: Axis, expr: Expr) -> Self {
        Variable { name: name.to_owned(), axis: axis, expr: expr }
    }

    /// Values for every row where the expression could be evaluated
    pub fn values<F: Fields>(&self, rows: &[&F]) -> Vec<f64> {
        rows.iter().filter_map(|r| self.expr.eval(*r)).collect()
    }
}

/// Standard variables
pub struct VariableDefs;

impl VariableDefs {
    pub fn all() -> Vec<Variable> {
        let regular = Axis::regular;
        vec![
            Variable::new("eventcount", regular(1, 0.0, 1.0), Expr::Constant(0.0)),
            Variable::new("n9", regular(26, 0.0, 60.0), Expr::field("n9")),
            Variable::new("innerPE", regular(100, 0.0, 100.0), Expr::field("innerPE")),
            Variable::new("mcenergy", regular(100, 0.0, 10.0), Expr::field("mc_energy")),
            Variable::new("innerPE_over_mcenergy", regular(100, 0.0, 50.0),
                Expr::Ratio(Box::new(Expr::field("innerPE")), Box::new(Expr::field("mc_energy")))),
            Variable::new("recox", regular(100, -8000.0, 8000.0), Expr::field("x")),
            Variable::new("recoy", regular(100, -8000.0, 8000.0), Expr::field("y")),
            Variable::new("recoz", regular(100, -8000.0, 8000.0), Expr::field("z")),
            Variable::new("recot", regular(100, -100.0, 10.0), Expr::field("t")),
            Variable::new("mcx", regular(100, -8000.0, 8000.0), Expr::field("mcx")),
            Variable::new("mcy", regular(100, -8000.0, 8000.0), Expr::field("mcy")),
            Variable::new("mcz", regular(100, -8000.0, 8000.0), Expr::field("mcz")),
            Variable::new("mct", regular(100, -200.0, 0.0), Expr::Scaled(Box::new(Expr::field("mct")), 1e-3)),
            Variable::new("deltax", regular(100, -2000.0, 2000.0), delta("x", "mcx")),
            Variable::new("deltay", regular(100, -2000.0, 2000.0), delta("y", "mcy")),
            Variable::new("deltaz", regular(100, -2000.0, 2000.0), delta("z", "mcz")),
            Variable::new("deltar", regular(100, -2000.0, 2000.0),
                Expr::Norm(vec![delta("x", "mcx"), delta("y", "mcy"), delta("z", "mcz")]))
        ]
    }
}

#[cfg(test)]
mod variable_test {
    use super::*;
    use crate::event::Candidate;

    #[test]
    fn test_expressions() {
        let c = Candidate::new(0)
            .with("x", 3.0).with("mcx", 0.0)
            .with("y", 4.0).with("mcy", 0.0)
            .with("z", 1.0).with("mcz", 1.0)
            .with("innerPE", 30.0).with("mc_energy", 3.0);
        let vars = VariableDefs::all();
        let get = |name: &str| vars.iter().find(|v| v.name == name).unwrap().expr.eval(&c);
        assert_eq!(get("deltar"), Some(5.0));
        assert_eq!(get("innerPE_over_mcenergy"), Some(10.0));
        assert_eq!(get("eventcount"), Some(0.0));
        assert_eq!(get("n9"), None);
    }

    #[test]
    fn test_values_skip_missing() {
        let rows = vec![Candidate::new(0).with("n9", 4.0), Candidate::new(1)];
        let refs: Vec<&Candidate> = rows.iter().collect();
        let n9 = Variable::new("n9", Axis::regular(26, 0.0, 60.0), Expr::field("n9"));
        assert_eq!(n9.values(&refs), vec![4.0]);
    }
}
