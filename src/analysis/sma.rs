/// Rolling mean over `window` values. The first `window - 1` points average
/// whatever is available so the output is as long as the input.
pub fn simple_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, value) in values.iter().enumerate() {
        sum += value;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(sum / count as f64);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    pub index: usize,
    pub signal: Signal,
    /// Short average at the crossing point.
    pub price: f64,
}

/// Points where the short average crosses the long one.
/// `Buy` when short moves above long, `Sell` when it drops back to or below.
pub fn crossovers(short: &[f64], long: &[f64]) -> Vec<Crossover> {
    let above: Vec<bool> = short.iter().zip(long).map(|(s, l)| s > l).collect();

    above
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let index = i + 1;
            let signal = match (pair[0], pair[1]) {
                (false, true) => Signal::Buy,
                (true, false) => Signal::Sell,
                _ => return None,
            };
            Some(Crossover { index, signal, price: short[index] })
        })
        .collect()
}
