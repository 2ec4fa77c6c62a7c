use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    stages: [Vec<T>; 4],
    probe: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            stages: std::array::from_fn(|_| vec![z; dim]),
            probe: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.stages[0]);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.probe[i] = state[i] + dt * half * self.stages[0][i];
        }
        system.apply(t0 + dt * half, &self.probe, &mut self.stages[1]);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.probe[i] = state[i] + dt * half * self.stages[1][i];
        }
        system.apply(t0 + dt * half, &self.probe, &mut self.stages[2]);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.probe[i] = state[i] + dt * self.stages[2][i];
        }
        system.apply(t0 + dt, &self.probe, &mut self.stages[3]);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            let combined = self.stages[0][i]
                + two * self.stages[1][i]
                + two * self.stages[2][i]
                + self.stages[3][i];
            state[i] = state[i] + dt * sixth * combined;
        }

        *t = t0 + dt;
    }
}

// Tsitouras 5(4) tableau. Only the 5th-order propagating solution is used;
// the embedded 4th-order error estimate has no role in fixed-step mode.
const TSIT5_C: [f64; 5] = [0.161, 0.327, 0.9, 0.9800255409045097, 1.0];

const TSIT5_A: [[f64; 5]; 5] = [
    [0.161, 0.0, 0.0, 0.0, 0.0],
    [-0.008480655492356989, 0.335480655492357, 0.0, 0.0, 0.0],
    [2.898, -6.359447987781783, 4.361447987781783, 0.0, 0.0],
    [
        5.325864858437957,
        -11.748883564062828,
        7.495539342889693,
        -0.09249506636030195,
        0.0,
    ],
    [
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.02826857949054663,
    ],
];

const TSIT5_B: [f64; 6] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436099,
    2.324710524099774,
];

/// Tsitouras 5/4 Solver, used as a fixed-step 5th-order method.
pub struct Tsit5<T: Scalar> {
    stages: [Vec<T>; 6],
    probe: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            stages: std::array::from_fn(|_| vec![z; dim]),
            probe: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;

        system.apply(t0, state, &mut self.stages[0]);

        for s in 1..6 {
            for i in 0..state.len() {
                let mut acc = T::from_f64(0.0).unwrap();
                for j in 0..s {
                    acc = acc + T::from_f64(TSIT5_A[s - 1][j]).unwrap() * self.stages[j][i];
                }
                self.probe[i] = state[i] + dt * acc;
            }
            let c = T::from_f64(TSIT5_C[s - 1]).unwrap();
            system.apply(t0 + c * dt, &self.probe, &mut self.stages[s]);
        }

        for i in 0..state.len() {
            let mut acc = T::from_f64(0.0).unwrap();
            for (j, b) in TSIT5_B.iter().enumerate() {
                acc = acc + T::from_f64(*b).unwrap() * self.stages[j][i];
            }
            state[i] = state[i] + dt * acc;
        }

        *t = t0 + dt;
    }
}

/// Discrete Map Stepper
/// Just evaluates x_{n+1} = f(x_n).
/// dt is treated as 1 iteration regardless of value, but we track t as t + dt.
pub struct DiscreteMap<T: Scalar> {
    next: Vec<T>,
}

impl<T: Scalar> DiscreteMap<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            next: vec![T::from_f64(0.0).unwrap(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for DiscreteMap<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.next);
        state.copy_from_slice(&self.next);
        *t = *t + dt;
    }
}
