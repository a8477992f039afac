#[cfg(test)]
mod causal_tests {
    use crate::bootstrap::Bootstrap;
    use crate::causal::aiptw::Aiptw;
    use crate::causal::gformula::TimeFixedGFormula;
    use crate::causal::nuisance::OutcomeType;
    use crate::causal::state::EstimatorState;
    use crate::causal::tmle::Tmle;
    use crate::config::EstimatorConfig;
    use crate::data::{Dataset, Row};
    use crate::errors::CausalError;
    use crate::family::Family;
    use crate::formula::ModelSpec;
    use crate::predictor::{Bound, GlmLearner, Learner, Predictor};
    use crate::treatment::{col, TreatmentRule};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const EXPOSURE: &str = "male + age0 + cd40 + dvl0";
    const OUTCOME: &str = "art + male + age0 + cd40 + dvl0";

    fn load_cohort() -> Dataset {
        let mut rdr =
            csv::Reader::from_path("resources/simulated_cohort.csv").expect("Something went wrong reading the file");
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(|h| h.to_string()).collect();
        let rows: Vec<Vec<f64>> = rdr
            .records()
            .map(|r| r.unwrap().iter().map(|v| v.parse::<f64>().unwrap()).collect())
            .collect();
        Dataset::from_rows(&headers, &rows).unwrap()
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {}, got {} (tolerance {})",
            expected,
            actual,
            tol
        );
    }

    fn aiptw(data: &Dataset, bound: Option<Bound>) -> Aiptw {
        let mut est = Aiptw::new(data, "art", "dead").unwrap();
        est.exposure_model(EXPOSURE, bound, false).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        est
    }

    /// Constant propensity equal to the treated share, the intercept-only model.
    fn marginal_learner(d: &Dataset, target: &str, _: Option<&str>) -> Result<Box<dyn Predictor>, CausalError> {
        let p = crate::utils::mean(d.column(target)?);
        Ok(Box::new(move |_: &Row<'_>| -> Result<f64, CausalError> { Ok(p) }))
    }

    /// Constant propensity learner whose predictor fails after `limit` predictions.
    fn expiring_learner(
        limit: usize,
    ) -> impl Fn(&Dataset, &str, Option<&str>) -> Result<Box<dyn Predictor>, CausalError> + Send + Sync {
        move |d: &Dataset, target: &str, _: Option<&str>| -> Result<Box<dyn Predictor>, CausalError> {
            let p = crate::utils::mean(d.column(target)?);
            let calls = Arc::new(AtomicUsize::new(0));
            Ok(Box::new(move |_: &Row<'_>| -> Result<f64, CausalError> {
                if calls.fetch_add(1, Ordering::SeqCst) < limit {
                    Ok(p)
                } else {
                    Err(CausalError::InvalidData("predictor expired".to_string()))
                }
            }))
        }
    }

    /// Cohort with `visits`, a count derived from the week 45 CD4 count.
    fn cohort_with_counts() -> Dataset {
        let data = load_cohort();
        let visits: Vec<f64> = data
            .column("cd4_wk45")
            .unwrap()
            .iter()
            .map(|v| (v.max(0.0) / 50.0).floor())
            .collect();
        data.with_column("visits", visits).unwrap()
    }

    fn tmle(data: &Dataset, bound: Option<Bound>) -> Tmle {
        let mut est = Tmle::new(data, "art", "dead").unwrap();
        est.exposure_model(EXPOSURE, bound, false).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, None, false).unwrap();
        est
    }

    // -----------------------------------------------------------------------
    // Nuisance regressions
    // -----------------------------------------------------------------------

    #[test]
    fn test_cohort_regressions() {
        let data = load_cohort();
        assert_eq!(data.n_rows(), 500);
        let exposure = GlmLearner::new(ModelSpec::parse(EXPOSURE).unwrap(), Family::Binomial)
            .fit_model(&data, "art")
            .unwrap();
        let beta = [
            -0.812541812277508,
            0.5897194140720683,
            0.003182734354881678,
            -0.0017689802572538444,
            0.14765518804825228,
        ];
        let se = [
            0.5239112213907573,
            0.2273816989686192,
            0.010561540175082481,
            0.0006665672163566301,
            0.24442888381097297,
        ];
        for j in 0..5 {
            assert_close(exposure.fit.coefficients[j], beta[j], 1e-5);
            assert_close(exposure.fit.standard_errors[j], se[j], 1e-5);
        }
        assert!(exposure.fit.converged);

        let outcome = GlmLearner::new(ModelSpec::parse(OUTCOME).unwrap(), Family::Binomial)
            .fit_model(&data, "dead")
            .unwrap();
        let beta = [
            -0.701008052825521,
            -0.6054332317518282,
            0.11245478969936434,
            0.006031849342583305,
            -0.004242998613200464,
            1.234764028645559,
        ];
        let se = [
            0.6612611173163347,
            0.29623378574812165,
            0.28118324530916494,
            0.013749684097503375,
            0.0009001961937755117,
            0.2770987365032858,
        ];
        for j in 0..6 {
            assert_close(outcome.fit.coefficients[j], beta[j], 1e-5);
            assert_close(outcome.fit.standard_errors[j], se[j], 1e-5);
        }
    }

    // -----------------------------------------------------------------------
    // g-formula
    // -----------------------------------------------------------------------

    #[test]
    fn test_gformula_cohort() {
        let data = load_cohort();
        let mut g = TimeFixedGFormula::new(&data, "art", "dead").unwrap();
        g.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        let all = g.fit(&TreatmentRule::All).unwrap().marginal_outcome;
        assert_close(all, 0.12014394156594561, 1e-6);
        let none = g.fit(&TreatmentRule::None).unwrap().marginal_outcome;
        assert_close(none, 0.1915123759857778, 1e-6);
        assert_close(all - none, -0.07136843441983219, 1e-6);

        let rule: TreatmentRule = col("cd40").lt(300.0).into();
        let res = g.fit(&rule).unwrap();
        assert_close(res.marginal_outcome, 0.15653316877683732, 1e-6);
        assert_eq!(res.n_treated_under_rule, 174);
        assert!(res.predicted_outcomes.iter().all(|p| *p > 0.0 && *p < 1.0));
        assert!((0.0..=1.0).contains(&res.marginal_outcome));

        let custom = TreatmentRule::custom(|row| Ok(row.get("cd40")? < 300.0));
        let res2 = g.fit(&custom).unwrap().marginal_outcome;
        assert_close(res2, 0.15653316877683732, 1e-12);
    }

    #[test]
    fn test_gformula_rule_errors() {
        let data = load_cohort();
        let mut g = TimeFixedGFormula::new(&data, "art", "dead").unwrap();
        g.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        let rule: TreatmentRule = col("cd4").lt(300.0).into();
        assert!(matches!(g.fit(&rule), Err(CausalError::InvalidTreatmentRule(_))));
        let rule: TreatmentRule = col("age0").into();
        assert!(matches!(g.fit(&rule), Err(CausalError::InvalidTreatmentRule(_))));
        assert_eq!(g.state(), EstimatorState::ModelsFit);
    }

    #[test]
    fn test_gformula_bootstrap() {
        let data = load_cohort();
        let risk_difference = |d: &Dataset| -> Result<f64, CausalError> {
            let mut g = TimeFixedGFormula::new(d, "art", "dead")?;
            g.outcome_model(OUTCOME, Family::Binomial, false)?;
            let all = g.fit(&TreatmentRule::All)?.marginal_outcome;
            let none = g.fit(&TreatmentRule::None)?.marginal_outcome;
            Ok(all - none)
        };
        let boot = Bootstrap::new(20, 11);
        let first = boot.run(&data, risk_difference).unwrap();
        let second = boot.run(&data, risk_difference).unwrap();
        assert_eq!(first.replicates, second.replicates);
        assert_eq!(first.replicates.len() + first.n_failed, 20);
        assert!(first.std_error > 0.0 && first.std_error < 0.1);
        assert!(first.ci_lower < first.ci_upper);
        assert!(first.replicates.iter().all(|rd| rd.abs() < 1.0));
    }

    // -----------------------------------------------------------------------
    // AIPTW
    // -----------------------------------------------------------------------

    #[test]
    fn test_aiptw_cohort() {
        let data = load_cohort();
        let mut est = aiptw(&data, None);
        let res = est.fit().unwrap();
        assert_close(res.mean_treated, 0.14080906312910926, 1e-6);
        assert_close(res.mean_untreated, 0.1951171433172245, 1e-6);
        let rd = res.risk_difference().unwrap();
        assert_close(rd.point, -0.054308080188115226, 1e-6);
        assert_close(rd.std_error.unwrap(), 0.03661959974491579, 1e-6);
        assert_close(rd.ci_lower.unwrap(), -0.1260811768164223, 1e-6);
        assert_close(rd.ci_upper.unwrap(), 0.017465016440191855, 1e-6);
        assert_close(res.risk_ratio.unwrap(), 0.721664230703602, 1e-6);
        assert!(res.average_treatment_effect().is_none());

        let p = est.positivity().unwrap();
        assert_close(p.mean_weight, 2.006457212753867, 1e-6);
        assert_close(p.std_weight, 1.0582627188946256, 1e-6);
        assert_close(p.min_weight, 1.1626446369868273, 1e-6);
        assert_close(p.max_weight, 8.154511413057996, 1e-5);
        assert_eq!(p.extreme_propensities, 0);

        let summary = est.summary().unwrap();
        assert!(summary.contains("Risk Difference"));
        assert!(summary.contains("95.0% two-sided CI"));
    }

    #[test]
    fn test_aiptw_bounded() {
        let data = load_cohort();
        let bound = Bound::new(0.2, 0.45).unwrap();
        let mut est = aiptw(&data, Some(bound));
        let res = est.fit().unwrap();
        assert_close(res.mean_treated, 0.13719627251788138, 1e-6);
        assert_close(res.mean_untreated, 0.1951165888257785, 1e-6);
        let rd = res.difference;
        assert_close(rd.point, -0.057920316307897124, 1e-6);
        assert_close(rd.std_error.unwrap(), 0.03541432206547435, 1e-6);
        assert_close(rd.ci_lower.unwrap(), -0.12733111209312897, 1e-6);
        assert_close(rd.ci_upper.unwrap(), 0.011490479477334725, 1e-6);
        assert_close(res.risk_ratio.unwrap(), 0.7031502208168741, 1e-6);

        // every weight comes from a propensity inside the bound
        let w = res.positivity;
        assert!(w.min_weight >= 1.0 / (1.0 - 0.2) - 1e-12);
        assert!(w.max_weight <= 1.0 / 0.2 + 1e-12);
    }

    #[test]
    fn test_aiptw_double_robustness() {
        let data = load_cohort();
        let correct = aiptw(&data, None).fit().unwrap().difference.point;

        // misspecified exposure model, correct outcome model
        let mut est = Aiptw::new(&data, "art", "dead").unwrap();
        est.exposure_model("1", None, false).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        let res = est.fit().unwrap();
        assert_close(res.difference.point, -0.07136843441985215, 1e-6);
        assert_close(res.difference.std_error.unwrap(), 0.034287446952446295, 1e-6);
        assert!((res.difference.point - correct).abs() < 0.025);

        // correct exposure model, misspecified outcome model
        let mut est = Aiptw::new(&data, "art", "dead").unwrap();
        est.exposure_model(EXPOSURE, None, false).unwrap();
        est.outcome_model("art", Family::Binomial, false).unwrap();
        let res = est.fit().unwrap();
        assert_close(res.difference.point, -0.05246212417340182, 1e-6);
        assert!((res.difference.point - correct).abs() < 0.025);
    }

    #[test]
    fn test_aiptw_continuous() {
        let data = load_cohort();
        let mut est = Aiptw::new(&data, "art", "cd4_wk45").unwrap();
        est.exposure_model(EXPOSURE, None, false).unwrap();
        est.outcome_model(OUTCOME, Family::Gaussian, false).unwrap();
        let res = est.fit().unwrap();
        assert!(res.risk_difference().is_none());
        assert!(res.risk_ratio.is_none());
        assert_close(res.mean_treated, 276.1897406548583, 1e-5);
        assert_close(res.mean_untreated, 204.99113582590917, 1e-5);
        let ate = res.average_treatment_effect().unwrap();
        assert_close(ate.point, 71.19860482894916, 1e-5);
        assert_close(ate.std_error.unwrap(), 5.919907824065109, 1e-5);
        assert_close(ate.ci_lower.unwrap(), 59.59579870198467, 1e-5);
        assert_close(ate.ci_upper.unwrap(), 82.80141095591365, 1e-5);

        let gaussian = GlmLearner::new(ModelSpec::parse(OUTCOME).unwrap(), Family::Gaussian)
            .fit_model(&data, "cd4_wk45")
            .unwrap();
        let beta = [
            49.82819860540568,
            71.5781372606198,
            3.8552976748951533,
            -1.137181325238766,
            0.5659214768566428,
            -2.5702076394977227,
        ];
        for j in 0..6 {
            assert_close(gaussian.fit.coefficients[j], beta[j], 1e-5);
        }
    }

    #[test]
    fn test_aiptw_requires_models() {
        let data = load_cohort();
        let mut est = Aiptw::new(&data, "art", "dead").unwrap();
        assert_eq!(est.state(), EstimatorState::Configured);
        assert!(matches!(est.fit(), Err(CausalError::ModelNotSpecified(_))));
        assert!(matches!(est.positivity(), Err(CausalError::ModelNotSpecified(_))));
        est.exposure_model(EXPOSURE, None, false).unwrap();
        assert!(matches!(est.fit(), Err(CausalError::ModelNotSpecified(_))));
        assert!(matches!(est.results(), Err(CausalError::ModelNotSpecified(_))));
        assert!(est.summary().is_err());
        est.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        assert_eq!(est.state(), EstimatorState::ModelsFit);
        est.fit().unwrap();
        assert_eq!(est.state(), EstimatorState::Estimated);

        // a failed refit leaves models and results in place
        assert!(matches!(
            est.exposure_model("male + cd40 + cd40", None, false),
            Err(CausalError::SingularModel(_))
        ));
        assert_eq!(est.state(), EstimatorState::Estimated);
        assert!(est.results().is_ok());

        // a successful refit invalidates the previous estimate
        est.exposure_model(EXPOSURE, Some(Bound::symmetric(0.05).unwrap()), false).unwrap();
        assert_eq!(est.state(), EstimatorState::ModelsFit);
        assert!(est.results().is_err());
    }

    #[test]
    fn test_aiptw_idempotent() {
        let data = load_cohort();
        let mut est = aiptw(&data, None);
        let first = est.fit().unwrap().clone();
        let second = est.fit().unwrap().clone();
        assert_eq!(first.difference, second.difference);
        assert_eq!(first.risk_ratio, second.risk_ratio);
        assert_eq!(first.positivity, second.positivity);
    }

    #[test]
    fn test_aiptw_pluggable_learner() {
        let data = load_cohort();
        let glm = GlmLearner::new(ModelSpec::parse(OUTCOME).unwrap(), Family::Binomial);
        let mut est = Aiptw::new(&data, "art", "dead").unwrap();
        est.exposure_model_with(&marginal_learner, None).unwrap();
        est.outcome_model_with(&glm as &dyn Learner, Family::Binomial).unwrap();
        let res = est.fit().unwrap();
        // a constant propensity equal to the treated share is the intercept-only model
        assert_close(res.difference.point, -0.07136843441985215, 1e-6);
    }

    #[test]
    fn test_aiptw_failed_fit_drops_result() {
        let data = load_cohort();
        let mut est = Aiptw::new(&data, "art", "dead").unwrap();
        est.exposure_model_with(&expiring_learner(data.n_rows()), None).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, false).unwrap();
        est.fit().unwrap();
        assert_eq!(est.state(), EstimatorState::Estimated);
        assert!(matches!(est.fit(), Err(CausalError::InvalidData(_))));
        assert!(matches!(est.results(), Err(CausalError::ModelNotSpecified(_))));
        assert_eq!(est.state(), EstimatorState::ModelsFit);
    }

    #[test]
    fn test_missing_data_is_rejected() {
        let data = load_cohort();
        let mut cd40 = data.column("cd40").unwrap().to_vec();
        cd40[3] = f64::NAN;
        cd40[10] = f64::NAN;
        let missing = data.with_column("cd40", cd40).unwrap();
        let mut est = Aiptw::new(&missing, "art", "dead").unwrap();
        match est.exposure_model(EXPOSURE, None, false) {
            Err(CausalError::MissingData { column, count }) => {
                assert_eq!(column, "cd40");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(est.state(), EstimatorState::Configured);
        // the caller's data is untouched
        assert!(data.column("cd40").unwrap().iter().all(|v| !v.is_nan()));
    }

    // -----------------------------------------------------------------------
    // TMLE
    // -----------------------------------------------------------------------

    #[test]
    fn test_tmle_cohort() {
        let data = load_cohort();
        let mut est = tmle(&data, None);
        let res = est.fit().unwrap();
        assert_close(res.epsilon, 0.03253161125769602, 1e-6);
        assert_close(res.mean_treated, 0.13069379840295814, 1e-6);
        assert_close(res.mean_untreated, 0.1847828969526295, 1e-6);

        let rd = res.risk_difference().unwrap();
        assert_close(rd.point, -0.054089098549671366, 1e-6);
        assert_close(rd.std_error.unwrap(), 0.0365418675103507, 1e-6);
        assert_close(rd.ci_lower.unwrap(), -0.12570984279779304, 1e-6);
        assert_close(rd.ci_upper.unwrap(), 0.01753164569845031, 1e-6);

        let rr = res.risk_ratio.unwrap();
        assert_close(rr.point, 0.7072829821282782, 1e-6);
        assert_close(rr.std_error.unwrap(), 0.25579349987036576, 1e-6);
        assert_close(rr.ci_lower.unwrap(), 0.4284117630072215, 1e-6);
        assert_close(rr.ci_upper.unwrap(), 1.1676831964108276, 1e-6);

        let or = res.odds_ratio.unwrap();
        assert_close(or.point, 0.6632751298288705, 1e-6);
        assert_close(or.std_error.unwrap(), 0.29812968984081967, 1e-6);
        assert_close(or.ci_lower.unwrap(), 0.3697645406392474, 1e-6);
        assert_close(or.ci_upper.unwrap(), 1.1897676750965605, 1e-6);

        assert_eq!(res.positivity.extreme_propensities, 0);

        let summary = est.summary().unwrap();
        assert!(summary.contains("Odds Ratio"));
        assert!(summary.contains("Epsilon"));
        assert!(summary.contains("IPT weights"));
        assert!(!summary.contains("Warning"));
    }

    #[test]
    fn test_tmle_pluggable_learner() {
        let data = load_cohort();
        let glm = GlmLearner::new(ModelSpec::parse(OUTCOME).unwrap(), Family::Binomial);
        let mut est = Tmle::new(&data, "art", "dead").unwrap();
        est.exposure_model_with(&marginal_learner, None).unwrap();
        est.outcome_model_with(&glm, Family::Binomial, None).unwrap();
        assert_eq!(est.state(), EstimatorState::ModelsFit);
        let res = est.fit().unwrap();
        // with a constant propensity the outcome model residuals already sum to zero within each arm
        assert!(res.epsilon.abs() < 1e-8, "epsilon {}", res.epsilon);
        assert_close(res.difference.point, -0.07136843441982885, 1e-6);
        assert_close(res.difference.std_error.unwrap(), 0.03428744695246004, 1e-6);
        assert_close(res.risk_ratio.unwrap().point, 0.6273429638556134, 1e-6);
        assert_close(res.odds_ratio.unwrap().point, 0.5764568163483091, 1e-6);
    }

    #[test]
    fn test_tmle_failed_fit_drops_result() {
        let data = load_cohort();
        let mut est = Tmle::new(&data, "art", "dead").unwrap();
        est.exposure_model_with(&expiring_learner(data.n_rows()), None).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, None, false).unwrap();
        est.fit().unwrap();
        assert!(matches!(est.fit(), Err(CausalError::InvalidData(_))));
        assert!(matches!(est.results(), Err(CausalError::ModelNotSpecified(_))));
        assert_eq!(est.state(), EstimatorState::ModelsFit);
    }

    #[test]
    fn test_tmle_bounded() {
        let data = load_cohort();
        let mut est = tmle(&data, Some(Bound::new(0.2, 0.45).unwrap()));
        let res = est.fit().unwrap();
        assert_close(res.epsilon, 0.02612428296767144, 1e-6);
        assert_close(res.difference.point, -0.05764470083080206, 1e-6);
        assert_close(res.difference.std_error.unwrap(), 0.035362390074958644, 1e-6);
        assert_close(res.risk_ratio.unwrap().point, 0.6902519952651447, 1e-6);
        assert_close(res.odds_ratio.unwrap().point, 0.6445980457416736, 1e-6);
    }

    #[test]
    fn test_tmle_continuous() {
        let data = load_cohort();
        let mut est = Tmle::new(&data, "art", "cd4_wk45").unwrap();
        est.exposure_model(EXPOSURE, None, false).unwrap();
        est.outcome_model(OUTCOME, Family::Gaussian, None, false).unwrap();
        let res = est.fit().unwrap();
        assert_close(res.epsilon, -0.0005899800896247895, 1e-6);
        let ate = res.average_treatment_effect().unwrap();
        assert_close(ate.point, 71.13169083470265, 1e-4);
        assert_close(ate.std_error.unwrap(), 5.915898194082301, 1e-4);
        assert!(res.risk_ratio.is_none() && res.odds_ratio.is_none());
        assert!(res.risk_difference().is_none());
        assert!(ate.ci_lower.unwrap() < ate.point && ate.point < ate.ci_upper.unwrap());
    }

    #[test]
    fn test_tmle_state_and_idempotence() {
        let data = load_cohort();
        let mut est = Tmle::new(&data, "art", "dead").unwrap();
        assert!(matches!(est.fit(), Err(CausalError::ModelNotSpecified(_))));
        est.outcome_model(OUTCOME, Family::Binomial, None, false).unwrap();
        assert_eq!(est.state(), EstimatorState::Configured);
        assert!(matches!(est.fit(), Err(CausalError::ModelNotSpecified(_))));
        est.exposure_model(EXPOSURE, None, false).unwrap();
        let first = est.fit().unwrap().clone();
        let second = est.fit().unwrap().clone();
        assert_eq!(first.epsilon, second.epsilon);
        assert_eq!(first.difference, second.difference);
        assert_eq!(first.odds_ratio, second.odds_ratio);
        assert_eq!(est.state(), EstimatorState::Estimated);
    }

    #[test]
    fn test_tmle_with_config() {
        let data = load_cohort();
        let config = EstimatorConfig::default().set_alpha(0.1);
        let mut est = Tmle::new(&data, "art", "dead").unwrap().with_config(config).unwrap();
        est.exposure_model(EXPOSURE, None, false).unwrap();
        est.outcome_model(OUTCOME, Family::Binomial, None, false).unwrap();
        let rd = est.fit().unwrap().difference;
        // 90% interval is narrower than the 95% one
        assert!(rd.ci_lower.unwrap() > -0.12570984279779304);
        assert!(rd.ci_upper.unwrap() < 0.01753164569845031);
        assert_close(rd.point, -0.054089098549671366, 1e-6);
        assert!(Tmle::new(&data, "art", "dead")
            .unwrap()
            .with_config(EstimatorConfig::default().set_alpha(2.0))
            .is_err());
    }

    // -----------------------------------------------------------------------
    // Count outcomes
    // -----------------------------------------------------------------------

    #[test]
    fn test_count_outcome() {
        let data = cohort_with_counts();

        let mut g = TimeFixedGFormula::new(&data, "art", "visits").unwrap();
        g.outcome_model(OUTCOME, Family::Poisson, false).unwrap();
        let all = g.fit(&TreatmentRule::All).unwrap();
        assert_eq!(all.outcome_type, OutcomeType::Continuous);
        let all = all.marginal_outcome;
        let none = g.fit(&TreatmentRule::None).unwrap().marginal_outcome;
        assert_close(all, 5.016636042934889, 1e-6);
        assert_close(all - none, 1.3607116952099627, 1e-6);

        let mut a = Aiptw::new(&data, "art", "visits").unwrap();
        a.exposure_model(EXPOSURE, None, false).unwrap();
        a.outcome_model(OUTCOME, Family::Poisson, false).unwrap();
        let res = a.fit().unwrap();
        assert!(res.risk_difference().is_none());
        assert!(res.risk_ratio.is_none());
        let ate = res.average_treatment_effect().unwrap();
        assert_close(ate.point, 1.2862610663863117, 1e-6);
        assert_close(ate.std_error.unwrap(), 0.1493720200481298, 1e-6);
        assert!(a.summary().unwrap().contains("Average Treatment Effect"));

        let mut t = Tmle::new(&data, "art", "visits").unwrap();
        t.exposure_model(EXPOSURE, None, false).unwrap();
        t.outcome_model(OUTCOME, Family::Poisson, None, false).unwrap();
        let res = t.fit().unwrap();
        assert!(res.risk_difference().is_none());
        assert!(res.risk_ratio.is_none() && res.odds_ratio.is_none());
        assert_close(res.epsilon, -0.002874908378767864, 1e-6);
        let ate = res.average_treatment_effect().unwrap();
        assert_close(ate.point, 1.278818124727743, 1e-5);
        assert_close(ate.std_error.unwrap(), 0.1325363079205149, 1e-5);
        assert_close(res.mean_treated - res.mean_untreated, ate.point, 1e-9);
    }

    // -----------------------------------------------------------------------
    // Saturated models
    // -----------------------------------------------------------------------

    /// Two strata of `l`, each treatment arm with a mix of outcomes.
    fn stratified() -> Dataset {
        let mut rows = Vec::new();
        // (l, a, n, events)
        for (l, a, n, events) in [(0.0, 0.0, 10, 2), (0.0, 1.0, 5, 2), (1.0, 0.0, 6, 3), (1.0, 1.0, 9, 6)] {
            for i in 0..n {
                rows.push(vec![l, a, if i < events { 1.0 } else { 0.0 }]);
            }
        }
        Dataset::from_rows(&["l", "a", "y"], &rows).unwrap()
    }

    #[test]
    fn test_saturated_models_agree() {
        let data = stratified();
        // standardized risk difference: 0.5 * (0.4 - 0.2) + 0.5 * (6/9 - 0.5)
        let expected = 0.5 * 0.2 + 0.5 * (6.0 / 9.0 - 0.5);

        let mut g = TimeFixedGFormula::new(&data, "a", "y").unwrap();
        g.outcome_model("a + l + a:l", Family::Binomial, false).unwrap();
        let all = g.fit(&TreatmentRule::All).unwrap().marginal_outcome;
        let none = g.fit(&TreatmentRule::None).unwrap().marginal_outcome;
        assert_close(all - none, expected, 1e-6);

        let mut a = Aiptw::new(&data, "a", "y").unwrap();
        a.exposure_model("l", None, false).unwrap();
        a.outcome_model("a + l + a:l", Family::Binomial, false).unwrap();
        assert_close(a.fit().unwrap().difference.point, expected, 1e-6);

        let mut t = Tmle::new(&data, "a", "y").unwrap();
        t.exposure_model("l", None, false).unwrap();
        t.outcome_model("a + l + a:l", Family::Binomial, None, false).unwrap();
        let res = t.fit().unwrap();
        // the initial fit already solves the score equation
        assert!(res.epsilon.abs() < 1e-5, "epsilon {}", res.epsilon);
        assert_close(res.difference.point, expected, 1e-6);
    }

    #[test]
    fn test_extreme_propensities_are_reported() {
        let data = stratified();
        let separated = |_: &Dataset, _: &str, _: Option<&str>| -> Result<Box<dyn Predictor>, CausalError> {
            Ok(Box::new(|row: &Row<'_>| -> Result<f64, CausalError> {
                Ok(if row.get("l")? == 1.0 { 0.995 } else { 0.005 })
            }))
        };

        let mut a = Aiptw::new(&data, "a", "y").unwrap();
        a.exposure_model_with(&separated, None).unwrap();
        a.outcome_model("a + l + a:l", Family::Binomial, false).unwrap();
        assert_eq!(a.fit().unwrap().positivity.extreme_propensities, 30);
        assert!(a.summary().unwrap().contains("Warning: 30 propensity scores"));

        let mut t = Tmle::new(&data, "a", "y").unwrap();
        t.exposure_model_with(&separated, None).unwrap();
        t.outcome_model("a + l + a:l", Family::Binomial, None, false).unwrap();
        let res = t.fit().unwrap();
        assert_eq!(res.positivity.extreme_propensities, 30);
        assert_close(res.positivity.max_weight, 200.0, 1e-9);
        assert!(t.summary().unwrap().contains("Warning: 30 propensity scores"));

        // bounding moves every propensity back inside the band
        t.exposure_model_with(&separated, Some(Bound::symmetric(0.05).unwrap())).unwrap();
        assert_eq!(t.fit().unwrap().positivity.extreme_propensities, 0);
    }

    #[test]
    fn test_constructor_validation() {
        let data = load_cohort();
        assert!(matches!(Aiptw::new(&data, "cd40", "dead"), Err(CausalError::InvalidData(_))));
        assert!(matches!(Tmle::new(&data, "art", "died"), Err(CausalError::UnknownColumn(_))));
        assert!(matches!(
            TimeFixedGFormula::new(&data, "art", "art"),
            Err(CausalError::InvalidParameter(..))
        ));
        let mut est = Aiptw::new(&data, "art", "cd4_wk45").unwrap();
        assert!(matches!(
            est.outcome_model(OUTCOME, Family::Binomial, false),
            Err(CausalError::InvalidData(_))
        ));
    }
}
