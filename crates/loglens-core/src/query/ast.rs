use std::fmt;

use super::value::Value;

/// A parsed SLAQ query over the virtual `logs` table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Query {
    pub projections: Vec<Projection>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// Expression tree. Every node carries the byte position of its start for
/// error reporting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal {
        value: Value,
        position: usize,
    },
    Column {
        name: String,
        position: usize,
    },
    FuncCall {
        name: String,
        args: Vec<Expr>,
        position: usize,
    },
    Neg {
        expr: Box<Expr>,
        position: usize,
    },
    Not {
        expr: Box<Expr>,
        position: usize,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: usize,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
        position: usize,
    },
    InList {
        expr: Box<Expr>,
        items: Vec<Value>,
        position: usize,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        position: usize,
    },
    Text {
        op: TextOp,
        expr: Box<Expr>,
        needle: String,
        position: usize,
    },
}

impl Expr {
    pub(crate) fn position(&self) -> usize {
        match self {
            Expr::Literal { position, .. }
            | Expr::Column { position, .. }
            | Expr::FuncCall { position, .. }
            | Expr::Neg { position, .. }
            | Expr::Not { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Like { position, .. }
            | Expr::InList { position, .. }
            | Expr::Between { position, .. }
            | Expr::Text { position, .. } => *position,
        }
    }

    /// Structural equality ignoring source positions; used to match
    /// projection expressions against GROUP BY keys.
    pub(crate) fn same_shape(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Literal { value: a, .. }, Expr::Literal { value: b, .. }) => a == b,
            (Expr::Column { name: a, .. }, Expr::Column { name: b, .. }) => a == b,
            (
                Expr::FuncCall { name: a, args: x, .. },
                Expr::FuncCall { name: b, args: y, .. },
            ) => a == b && x.len() == y.len() && x.iter().zip(y).all(|(l, r)| l.same_shape(r)),
            (Expr::Neg { expr: a, .. }, Expr::Neg { expr: b, .. })
            | (Expr::Not { expr: a, .. }, Expr::Not { expr: b, .. }) => a.same_shape(b),
            (
                Expr::Binary {
                    op: oa,
                    left: la,
                    right: ra,
                    ..
                },
                Expr::Binary {
                    op: ob,
                    left: lb,
                    right: rb,
                    ..
                },
            ) => oa == ob && la.same_shape(lb) && ra.same_shape(rb),
            (
                Expr::Like {
                    expr: a,
                    pattern: pa,
                    ..
                },
                Expr::Like {
                    expr: b,
                    pattern: pb,
                    ..
                },
            ) => pa == pb && a.same_shape(b),
            (
                Expr::InList {
                    expr: a, items: ia, ..
                },
                Expr::InList {
                    expr: b, items: ib, ..
                },
            ) => ia == ib && a.same_shape(b),
            (
                Expr::Between {
                    expr: a,
                    low: la,
                    high: ha,
                    ..
                },
                Expr::Between {
                    expr: b,
                    low: lb,
                    high: hb,
                    ..
                },
            ) => a.same_shape(b) && la.same_shape(lb) && ha.same_shape(hb),
            (
                Expr::Text {
                    op: oa,
                    expr: a,
                    needle: na,
                    ..
                },
                Expr::Text {
                    op: ob,
                    expr: b,
                    needle: nb,
                    ..
                },
            ) => oa == ob && na == nb && a.same_shape(b),
            _ => false,
        }
    }
}

// Canonical text used for projection column headers.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => write!(f, "{}", value.render()),
            Expr::Column { name, .. } => write!(f, "{name}"),
            Expr::FuncCall { name, args, .. } => {
                write!(f, "{name}(")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Neg { expr, .. } => write!(f, "-{expr}"),
            Expr::Not { expr, .. } => write!(f, "NOT {expr}"),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "{left} {} {right}", op_symbol(*op)),
            Expr::Like { expr, pattern, .. } => write!(f, "{expr} LIKE '{pattern}'"),
            Expr::InList { expr, items, .. } => {
                write!(f, "{expr} IN (")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.render())?;
                }
                write!(f, ")")
            }
            Expr::Between {
                expr, low, high, ..
            } => write!(f, "{expr} BETWEEN {low} AND {high}"),
            Expr::Text {
                op, expr, needle, ..
            } => {
                let name = match op {
                    TextOp::Contains => "CONTAINS",
                    TextOp::StartsWith => "STARTS_WITH",
                    TextOp::EndsWith => "ENDS_WITH",
                };
                write!(f, "{expr} {name} '{needle}'")
            }
        }
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "OR",
        BinaryOp::And => "AND",
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::LtEq => "<=",
        BinaryOp::GtEq => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
    }
}
