use crate::domain::score::StateLabel;

/// `|z|>2` wins an extension label, then `RSI>80`/`<20` a stress label,
/// else equilibrium; absent both inputs, `NA` (spec §4.6 "State
/// label"). z-score is checked first since it is the longer-horizon
/// signal of the two.
pub fn classify(zscore: Option<f64>, rsi: Option<f64>) -> StateLabel {
    if zscore.is_none() && rsi.is_none() {
        return StateLabel::Na;
    }

    if let Some(z) = zscore {
        if z > 2.0 {
            return StateLabel::ExtensionHaute;
        }
        if z < -2.0 {
            return StateLabel::ExtensionBasse;
        }
    }

    if let Some(r) = rsi {
        if r > 80.0 {
            return StateLabel::StressHaussier;
        }
        if r < 20.0 {
            return StateLabel::StressBaissier;
        }
    }

    StateLabel::Equilibre
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_yields_na() {
        assert_eq!(classify(None, None), StateLabel::Na);
    }

    #[test]
    fn high_zscore_is_extension_haute() {
        assert_eq!(classify(Some(2.5), Some(50.0)), StateLabel::ExtensionHaute);
    }

    #[test]
    fn overbought_rsi_is_stress_haussier() {
        assert_eq!(classify(Some(0.0), Some(85.0)), StateLabel::StressHaussier);
    }

    #[test]
    fn mid_range_is_equilibre() {
        assert_eq!(classify(Some(0.5), Some(55.0)), StateLabel::Equilibre);
    }
}
