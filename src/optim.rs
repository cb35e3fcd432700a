use crate::common::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdadeltaConfig {
    pub lr: f64,
    pub rho: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdadeltaConfig {
    fn default() -> Self {
        Self {
            lr: 1.0,
            rho: 0.9,
            eps: 1e-6,
            weight_decay: 0.0,
        }
    }
}

impl AdadeltaConfig {
    pub fn build(self, vs: &VarStore) -> Adadelta {
        let vars = vs.trainable_variables();
        let square_avgs = vars.iter().map(Tensor::zeros_like).collect();
        let acc_deltas = vars.iter().map(Tensor::zeros_like).collect();

        Adadelta {
            config: self,
            vars,
            square_avgs,
            acc_deltas,
        }
    }
}

/// Adadelta over the trainable variables of one variable store.
///
/// Variables whose gradient is undefined, e.g. those of a frozen store, are left
/// untouched by `step`.
#[derive(Debug)]
pub struct Adadelta {
    config: AdadeltaConfig,
    vars: Vec<Tensor>,
    square_avgs: Vec<Tensor>,
    acc_deltas: Vec<Tensor>,
}

impl Adadelta {
    pub fn zero_grad(&mut self) {
        for var in self.vars.iter_mut() {
            var.zero_grad();
        }
    }

    pub fn step(&mut self) {
        let AdadeltaConfig {
            lr,
            rho,
            eps,
            weight_decay,
        } = self.config;

        tch::no_grad(|| {
            let states = self.square_avgs.iter_mut().zip(self.acc_deltas.iter_mut());

            for (var, (square_avg, acc_delta)) in self.vars.iter_mut().zip(states) {
                let grad = var.grad();
                if !grad.defined() {
                    continue;
                }
                let grad = if weight_decay != 0.0 {
                    grad + &*var * weight_decay
                } else {
                    grad
                };

                *square_avg *= rho;
                *square_avg += &grad * &grad * (1.0 - rho);

                let std = (&*square_avg + eps).sqrt();
                let delta = (&*acc_delta + eps).sqrt() / std * &grad;

                *acc_delta *= rho;
                *acc_delta += &delta * &delta * (1.0 - rho);

                *var -= delta * lr;
            }
        });
    }

    pub fn backward_step(&mut self, loss: &Tensor) {
        self.zero_grad();
        loss.backward();
        self.step();
    }
}
