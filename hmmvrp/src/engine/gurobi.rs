use crate::config::SolverConfig;
use crate::cuts::{CutRow, Sense};
use crate::decomposition::{CandidateContext, Decomposition, IncumbentContext};
use crate::engine::{Engine, Status};
use crate::error::{Error, Result};
use crate::model::{MasterModel, VarKind};
use log::{debug, info};

pub struct GurobiEngine {
    _env: grb::Env,
    model: grb::Model,
    variables: Vec<grb::Var>,
}

fn bound(value: f64) -> f64 {
    value.clamp(-grb::INFINITY, grb::INFINITY)
}

fn expression(variables: &[grb::Var], row: &CutRow) -> grb::constr::IneqExpr {
    let mut lhs = grb::expr::LinExpr::new();
    for &(var, coeff) in &row.terms {
        lhs.add_term(coeff, variables[var]);
    }
    let rhs = row.rhs;
    match row.sense {
        Sense::Le => grb::c!(lhs <= rhs),
        Sense::Eq => grb::c!(lhs == rhs),
        Sense::Ge => grb::c!(lhs >= rhs),
    }
}

impl GurobiEngine {
    pub fn load(master: &MasterModel, config: &SolverConfig) -> Result<Self> {
        let mut env = grb::Env::new("hmmvrp_gurobi.log")?;
        env.set(grb::param::LogToConsole, 0)?;
        if config.threads > 0 {
            env.set(grb::param::Threads, config.threads as i32)?;
        }

        let mut model = grb::Model::with_env(&master.instance().name, &env)?;
        model.set_param(grb::param::LazyConstraints, 1)?;
        if let Some(limit) = config.time_limit {
            model.set_param(grb::param::TimeLimit, limit)?;
        }
        model.set_objective(0, grb::ModelSense::Minimize)?;

        let mut variables = Vec::with_capacity(master.variables().len());
        for spec in master.variables() {
            let vtype = match spec.kind {
                VarKind::Continuous => grb::VarType::Continuous,
                VarKind::Binary => grb::VarType::Binary,
                VarKind::Integer => grb::VarType::Integer,
            };
            let var = model.add_var(
                &spec.name,
                vtype,
                spec.objective,
                bound(spec.lower),
                bound(spec.upper),
                std::iter::empty(),
            )?;
            variables.push(var);
        }

        let mut engine = GurobiEngine {
            _env: env,
            model,
            variables,
        };
        for (name, row) in master.constraints() {
            engine.add_constraint(name, row)?;
        }
        engine.model.update()?;
        debug!("Loaded {} variables into gurobi", engine.variables.len());
        Ok(engine)
    }
}

impl Engine for GurobiEngine {
    fn add_constraint(&mut self, name: &str, row: &CutRow) -> Result<()> {
        if row.terms.iter().any(|&(var, _)| var >= self.variables.len()) {
            return Err(Error::ModelConstruction(format!(
                "constraint {name} references an unknown variable"
            )));
        }
        self.model.add_constr(name, expression(&self.variables, row))?;
        Ok(())
    }

    fn optimize(&mut self, decomposition: &Decomposition) -> Result<()> {
        let mut callbacks = Callbacks {
            decomposition,
            variables: &self.variables,
        };
        self.model.optimize_with_callback(&mut callbacks)?;
        info!("Gurobi finished with status {:?}", self.model.status()?);
        Ok(())
    }

    fn status(&self) -> Result<Status> {
        Ok(match self.model.status()? {
            grb::Status::Optimal => Status::Optimal,
            grb::Status::Infeasible | grb::Status::InfOrUnbd | grb::Status::Unbounded => {
                Status::InfeasibleOrUnbounded
            }
            grb::Status::TimeLimit => Status::TimeLimit,
            _ => Status::Other,
        })
    }

    fn objective(&self) -> Result<f64> {
        Ok(self.model.get_attr(grb::attr::ObjVal)?)
    }

    fn bound(&self) -> Result<f64> {
        Ok(self.model.get_attr(grb::attr::ObjBound)?)
    }

    fn values(&self) -> Result<Option<Vec<f64>>> {
        if self.model.get_attr(grb::attr::SolCount)? == 0 {
            return Ok(None);
        }
        let values = self
            .model
            .get_obj_attr_batch(grb::attr::X, self.variables.clone())?;
        Ok(Some(values))
    }
}

struct Callbacks<'d, 'a> {
    decomposition: &'d Decomposition<'a>,
    variables: &'d [grb::Var],
}

impl grb::callback::Callback for Callbacks<'_, '_> {
    fn callback(&mut self, w: grb::callback::Where) -> grb::callback::CbResult {
        match w {
            grb::callback::Where::MIPSol(ctx) => {
                let mut event = SolutionEvent {
                    ctx: &ctx,
                    variables: self.variables,
                };
                self.decomposition.on_candidate(&mut event);
            }
            grb::callback::Where::MIPNode(ctx) => {
                if ctx.status()? == grb::Status::Optimal {
                    let mut event = NodeEvent {
                        ctx: &ctx,
                        variables: self.variables,
                    };
                    self.decomposition.on_node(&mut event);
                }
            }
            _ => (),
        }
        Ok(())
    }
}

struct SolutionEvent<'c, 'g> {
    ctx: &'c grb::callback::MIPSolCtx<'g>,
    variables: &'c [grb::Var],
}

impl CandidateContext for SolutionEvent<'_, '_> {
    fn values(&self) -> Result<Vec<f64>> {
        Ok(self.ctx.get_solution(self.variables)?)
    }

    fn objective(&self) -> Result<f64> {
        Ok(self.ctx.obj()?)
    }

    fn add_lazy(&mut self, row: &CutRow) -> Result<()> {
        self.ctx
            .add_lazy(expression(self.variables, row))
            .map_err(|e| Error::CallbackSubmission(e.to_string()))
    }
}

struct NodeEvent<'c, 'g> {
    ctx: &'c grb::callback::MIPNodeCtx<'g>,
    variables: &'c [grb::Var],
}

impl IncumbentContext for NodeEvent<'_, '_> {
    fn best_objective(&self) -> Result<f64> {
        Ok(self.ctx.obj_best()?)
    }

    fn set_solution(&mut self, values: &[f64]) -> Result<Option<f64>> {
        self.ctx
            .set_solution(self.variables.iter().zip(values.iter().copied()))
            .map_err(|e| Error::CallbackSubmission(e.to_string()))
    }
}
