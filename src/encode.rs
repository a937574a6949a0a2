//! The shared ReLU-as-complementarity encoding primitive.
//!
//! Every formulation in this crate encodes the network the same way. For
//! each neuron `j` of computed layer `k`:
//!
//! - `x[k,j] in [xLB, xUB]` and `s[k,j] in [sLB, sUB]`, the non-negative
//!   decomposition of the pre-activation,
//! - binary `z[k,j]` with the indicators `z = 1 => x = 0` and
//!   `z = 0 => s = 0`,
//! - the affine definition
//!   `sum_i w[k,j,i] * a_i + b[k,j] = x[k,j] - s[k,j]`,
//!
//! where `a_i` is the previous layer's `x` variable, except at the first
//! hidden layer where the caller supplies one linear expression per input
//! dimension. That single seam covers every query: a raw input variable,
//! a fixed constant, a constant scaled and shifted by shared transform
//! variables, or an input variable transformed by fixed constants.

use crate::dnn::Network;
use crate::milp::{CmpOp, LinConstraint, LinExpr, MilpProblem, VarId};

/// Variables of one encoded computed layer.
#[derive(Clone, Debug)]
pub struct LayerVars {
    pub x: Vec<VarId>,
    pub s: Vec<VarId>,
    pub z: Vec<VarId>,
}

/// MILP variables of one fully encoded network, indexed by layer position
/// (entry `k - 1` holds computed layer `k`).
#[derive(Clone, Debug)]
pub struct NetworkEncoding {
    layers: Vec<LayerVars>,
}

impl NetworkEncoding {
    /// Encodes all computed layers of `network` into `problem`, chaining
    /// from the per-input expressions `inputs`.
    ///
    /// # Panics
    /// If `inputs` does not match the network's input dimension.
    pub fn encode(problem: &mut MilpProblem, network: &Network, inputs: &[LinExpr]) -> Self {
        assert_eq!(inputs.len(), network.input_dim());
        let mut layers: Vec<LayerVars> = Vec::with_capacity(network.num_layers());

        for layer in network.layers().iter().skip(1) {
            let n = layer.num_neurons();
            let mut vars = LayerVars {
                x: Vec::with_capacity(n),
                s: Vec::with_capacity(n),
                z: Vec::with_capacity(n),
            };
            for j in 0..n {
                let (xlb, xub) = layer.x_bounds().get(j);
                let (slb, sub) = layer.s_bounds().get(j);
                vars.x.push(problem.add_var(xlb, xub));
                vars.s.push(problem.add_var(slb, sub));
                vars.z.push(problem.add_binary());
            }

            let weights = layer.weights();
            let bias = layer.bias();
            for j in 0..n {
                // sum_i w[j,i] * a_i + b_j - x_j + s_j = 0
                let mut def = LinExpr::constant(bias[j]);
                for i in 0..weights.ncols() {
                    let w = weights[[j, i]];
                    match layers.last() {
                        Some(prev) => {
                            def.add_term(prev.x[i], w);
                        }
                        None => {
                            for &(var, coeff) in &inputs[i].terms {
                                def.add_term(var, w * coeff);
                            }
                            def.add_constant(w * inputs[i].constant);
                        }
                    }
                }
                def.add_term(vars.x[j], -1.);
                def.add_term(vars.s[j], 1.);
                problem.add_constraint(def, CmpOp::Eq, 0.);

                problem.add_indicator(
                    vars.z[j],
                    true,
                    LinConstraint {
                        expr: LinExpr::term(vars.x[j], 1.),
                        op: CmpOp::Eq,
                        rhs: 0.,
                    },
                );
                problem.add_indicator(
                    vars.z[j],
                    false,
                    LinConstraint {
                        expr: LinExpr::term(vars.s[j], 1.),
                        op: CmpOp::Eq,
                        rhs: 0.,
                    },
                );
            }
            layers.push(vars);
        }

        Self { layers }
    }

    /// Variables of computed layer `k` (1-based, as in the network).
    ///
    /// # Panics
    /// If `k` is 0 or past the last layer.
    pub fn layer(&self, k: usize) -> &LayerVars {
        assert!(k >= 1, "the input layer is not encoded");
        &self.layers[k - 1]
    }

    /// Output-layer `x` variables.
    pub fn output(&self) -> &[VarId] {
        &self.layers.last().unwrap().x
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

/// Input expressions for a network whose input layer is made of fresh MILP
/// variables bounded by the layer-0 domain bounds. Returns the variables
/// alongside the expressions so callers can read the recovered input back.
pub fn free_input_vars(problem: &mut MilpProblem, network: &Network) -> (Vec<VarId>, Vec<LinExpr>) {
    let bounds = network.layer(0).x_bounds();
    let vars: Vec<VarId> = (0..network.input_dim())
        .map(|i| {
            let (lb, ub) = bounds.get(i);
            problem.add_var(lb, ub)
        })
        .collect();
    let exprs = vars.iter().map(|&v| LinExpr::term(v, 1.)).collect();
    (vars, exprs)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn test_variable_and_constraint_counts() {
        let net = fixed_network(); // 2 -> 3 -> 2
        let mut problem = MilpProblem::new();
        let (vars, inputs) = free_input_vars(&mut problem, &net);
        let enc = NetworkEncoding::encode(&mut problem, &net, &inputs);

        assert_eq!(vars.len(), 2);
        assert_eq!(enc.num_layers(), 2);
        assert_eq!(enc.layer(1).x.len(), 3);
        assert_eq!(enc.output().len(), 2);
        // 2 input + (3 + 2) * (x, s, z)
        assert_eq!(problem.num_vars(), 2 + 5 * 3);
        // one affine definition per neuron
        assert_eq!(problem.constraints.len(), 5);
        // two complementarity indicators per neuron
        assert_eq!(problem.indicators.len(), 10);
    }

    #[test]
    fn test_first_layer_folds_input_constants() {
        let net = fixed_network();
        let mut problem = MilpProblem::new();
        let inputs = vec![LinExpr::constant(0.5), LinExpr::constant(0.25)];
        NetworkEncoding::encode(&mut problem, &net, &inputs);
        // fixed inputs leave no input variables behind
        assert_eq!(problem.num_vars(), 5 * 3);
        let first_def = &problem.constraints[0];
        // bias + w . input folded into the constant, plus -x + s
        assert_eq!(first_def.expr.terms.len(), 2);
    }
}
