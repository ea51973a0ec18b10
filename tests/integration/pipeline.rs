//! End-to-end pipeline tests.
//!
//! Drives feeds → consensus → card building and single scanning → Kelly
//! sizing → daily cap through the public API, with in-memory feeds.

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::mock_feed::*;
    use propedge::config::AppConfig;
    use propedge::feeds::snapshot::SnapshotFeed;
    use propedge::feeds::{fetch_all, OddsFeed};
    use propedge::storage::{self, RunReport};
    use propedge::strategy::{DecisionRecord, Recommendations, Recommender};
    use propedge::types::{BookQuote, Confidence, PickOffer, Platform, Side, Wager};

    fn make_recommender(cfg: &AppConfig) -> Recommender {
        cfg.recommender().unwrap()
    }

    fn run(cfg: &AppConfig, quotes: &[BookQuote], offers: &[PickOffer]) -> Recommendations {
        make_recommender(cfg)
            .recommend(quotes, offers, cfg.bankroll.amount)
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_from_feeds() {
        let feeds: Vec<Box<dyn OddsFeed>> = vec![Box::new(MockFeed::new("board", slate_quotes()))];
        let quotes = fetch_all(&feeds).await;
        assert_eq!(quotes.len(), SLATE.len() * 6);

        let cfg = AppConfig::default();
        let recs = run(&cfg, &quotes, &slate_offers(Platform::PrizePicks));

        assert_eq!(recs.consensus_props, SLATE.len());
        assert_eq!(recs.insufficient_props, 0);
        assert!(!recs.cards.is_empty());
        // Sharp books priced with margin leave no single edges.
        assert!(recs.singles.is_empty());

        for card in &recs.cards {
            assert!(card.id.starts_with("PP_"), "unexpected structure: {}", card.id);
            // The coin flip never clears a break-even.
            assert!(!card.id.contains("anthony edwards"));
            assert!(card.expected_value > 0.0);
            assert!(card.recommended_stake > Decimal::ZERO);
            match &card.wager {
                Wager::Card { legs, .. } => {
                    let mut players: Vec<_> = legs.iter().map(|l| l.player_key()).collect();
                    players.sort();
                    players.dedup();
                    assert_eq!(players.len(), legs.len());
                }
                Wager::Single { .. } => panic!("single in card list"),
            }
        }
        for pair in recs.cards.windows(2) {
            assert!(pair[0].score() >= pair[1].score());
        }
    }

    #[test]
    fn test_daily_cap_scales_batch() {
        let cfg = AppConfig::default();
        let recs = run(&cfg, &slate_quotes(), &slate_offers(Platform::PrizePicks));

        // 10% of the default $1000 bankroll.
        assert_eq!(recs.allocation.cap, dec!(100));
        assert!(recs.allocation.scaling_applied);
        assert!(recs.allocation.requested_total > dec!(100));
        assert!(recs.total_staked() <= dec!(100));
        assert!(recs.allocation.scale_factor < 1.0);

        let scaled = recs
            .decisions
            .iter()
            .filter(|d| matches!(d, DecisionRecord::Scaled { .. }))
            .count();
        assert_eq!(scaled, recs.cards.len());

        let staked: Decimal = recs.cards.iter().map(|c| c.recommended_stake).sum();
        assert_eq!(staked, recs.total_staked());
    }

    #[test]
    fn test_structure_restriction_and_exposure() {
        let mut cfg = AppConfig::default();
        cfg.builder.structures = vec!["PP_2P".to_string()];
        let recs = run(&cfg, &slate_quotes(), &slate_offers(Platform::PrizePicks));

        // Four qualifying legs give six pairs; each player lands on exactly three.
        assert_eq!(recs.cards.len(), 6);
        assert!(recs.cards.iter().all(|c| c.id.starts_with("PP_2P[")));
        assert!(recs.cards[0].id.contains("jalen brunson"));
        assert!(recs.cards[0].id.contains("nikola jokic"));
    }

    #[test]
    fn test_both_platforms_get_cards() {
        let cfg = AppConfig::default();
        let mut offers = slate_offers(Platform::PrizePicks);
        offers.extend(slate_offers(Platform::Underdog));
        let recs = run(&cfg, &slate_quotes(), &offers);

        assert!(recs.cards.iter().any(|c| c.id.starts_with("PP_")));
        assert!(recs.cards.iter().any(|c| c.id.starts_with("UD_")));
    }

    #[test]
    fn test_thin_and_unmatched_props_are_logged() {
        let cfg = AppConfig::default();
        let mut quotes = slate_quotes();
        quotes.extend(priced_pair("fanduel", "Trae Young", "assists", 10.5, 0.70, "atl-mia"));

        let mut offers = slate_offers(Platform::PrizePicks);
        offers.push(offer(Platform::PrizePicks, "Trae Young", "assists", 10.5, "atl-mia"));
        offers.push(offer(Platform::PrizePicks, "Luka Doncic", "points", 30.5, "dal-phx"));

        let recs = run(&cfg, &quotes, &offers);
        assert_eq!(recs.consensus_props, SLATE.len());
        assert_eq!(recs.insufficient_props, 1);

        assert!(recs.decisions.contains(&DecisionRecord::InsufficientData {
            prop: "trae young|assists|10.5".to_string(),
            paired_books: 1,
        }));
        let unmatched: Vec<_> = recs
            .decisions
            .iter()
            .filter_map(|d| match d {
                DecisionRecord::UnmatchedOffer { prop, .. } => Some(prop.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(unmatched, vec!["trae young|assists|10.5", "luka doncic|points|30.5"]);
        assert!(recs.cards.iter().all(|c| !c.id.contains("trae young")));
    }

    #[test]
    fn test_soft_book_single() {
        let cfg = AppConfig::default();
        let mut quotes = slate_quotes();
        quotes.push(quote("betmgm", "Anthony Edwards", "threes", 3.5, Side::Over, 130.0, "min-okc"));

        let recs = run(&cfg, &quotes, &[]);
        assert!(recs.cards.is_empty());
        assert_eq!(recs.singles.len(), 1);

        let single = &recs.singles[0];
        assert_eq!(single.id, "betmgm:anthony edwards|threes|3.5:OVER");
        assert!((single.true_probability - 0.5).abs() < 1e-9);
        // 0.5 · 2.3 − 1
        assert!((single.expected_value - 0.15).abs() < 1e-9);
        assert_eq!(single.confidence, Confidence::Consensus { books: 3 });
        assert!(!recs.allocation.scaling_applied);
        // 0.25 · 0.15 / 1.3 of $1000
        assert_eq!(single.recommended_stake, dec!(28.84));
    }

    #[test]
    fn test_quote_order_does_not_matter() {
        let cfg = AppConfig::default();
        let offers = slate_offers(Platform::PrizePicks);
        let quotes = slate_quotes();
        let mut reversed = quotes.clone();
        reversed.reverse();

        let a = run(&cfg, &quotes, &offers);
        let b = run(&cfg, &reversed, &offers);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_failed_feed_does_not_block_run() {
        let feeds: Vec<Box<dyn OddsFeed>> = vec![
            Box::new(MockFeed::failing("down", "HTTP 503")),
            Box::new(MockFeed::new("board", slate_quotes())),
        ];
        let quotes = fetch_all(&feeds).await;
        assert_eq!(quotes.len(), SLATE.len() * 6);

        let recs = run(&AppConfig::default(), &quotes, &slate_offers(Platform::PrizePicks));
        assert!(!recs.cards.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_quote_does_not_sink_slate() {
        let mut quotes = slate_quotes();
        let mut zero = quotes[0].clone();
        zero.book = "offshore".to_string();
        zero.price = 0.0;
        let mut tight = quotes[1].clone();
        tight.book = "offshore".to_string();
        tight.price = 50.0;
        quotes.push(zero);
        quotes.push(tight);

        let mut path = std::env::temp_dir();
        path.push(format!("propedge_it_snapshot_{}.json", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();
        std::fs::write(&path, serde_json::to_string(&quotes).unwrap()).unwrap();

        let feeds: Vec<Box<dyn OddsFeed>> = vec![Box::new(SnapshotFeed::new(path.clone()))];
        let fetched = fetch_all(&feeds).await;
        std::fs::remove_file(&path).unwrap();
        assert_eq!(fetched.len(), SLATE.len() * 6);
        assert!(fetched.iter().all(|q| q.book != "offshore"));

        let cfg = AppConfig::default();
        let offers = slate_offers(Platform::PrizePicks);
        let recs = run(&cfg, &fetched, &offers);
        assert_eq!(recs.consensus_props, SLATE.len());
        assert_eq!(recs, run(&cfg, &slate_quotes(), &offers));
    }

    #[test]
    fn test_offers_half_a_point_off_still_match() {
        let cfg = AppConfig::default();
        let exact = slate_offers(Platform::PrizePicks);
        let shifted: Vec<PickOffer> = exact
            .iter()
            .cloned()
            .map(|mut o| {
                o.line -= 0.5;
                o
            })
            .collect();

        let a = run(&cfg, &slate_quotes(), &exact);
        let b = run(&cfg, &slate_quotes(), &shifted);
        assert!(!b
            .decisions
            .iter()
            .any(|d| matches!(d, DecisionRecord::UnmatchedOffer { .. })));
        assert_eq!(a.cards.len(), b.cards.len());
        assert_eq!(a.total_staked(), b.total_staked());
        assert!(b.cards.iter().any(|c| c.id.contains("jalen brunson|points|26:")));

        // A full point away is past the tolerance.
        let far: Vec<PickOffer> = exact
            .iter()
            .cloned()
            .map(|mut o| {
                o.line += 1.0;
                o
            })
            .collect();
        let c = run(&cfg, &slate_quotes(), &far);
        assert!(c.cards.is_empty());
    }

    #[test]
    fn test_team_limit_applies_to_offers() {
        let mut cfg = AppConfig::default();
        cfg.builder.structures = vec!["PP_3P".to_string()];
        cfg.builder.max_legs_per_team = 1;
        let offers: Vec<PickOffer> = slate_offers(Platform::PrizePicks)
            .into_iter()
            .map(|mut o| {
                o.team = Some("same".to_string());
                o
            })
            .collect();

        let recs = run(&cfg, &slate_quotes(), &offers);
        assert!(recs.cards.is_empty());
    }

    #[test]
    fn test_empty_snapshot() {
        let recs = run(&AppConfig::default(), &[], &slate_offers(Platform::Underdog));
        assert!(recs.cards.is_empty());
        assert!(recs.singles.is_empty());
        assert_eq!(recs.total_staked(), Decimal::ZERO);
        assert_eq!(
            recs.decisions
                .iter()
                .filter(|d| matches!(d, DecisionRecord::UnmatchedOffer { .. }))
                .count(),
            SLATE.len()
        );
    }

    #[test]
    fn test_report_round_trip() {
        let cfg = AppConfig::default();
        let recs = run(&cfg, &slate_quotes(), &slate_offers(Platform::PrizePicks));
        let report = RunReport::new(cfg.bankroll.amount, recs);

        let mut path = std::env::temp_dir();
        path.push(format!("propedge_it_report_{}.json", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        storage::save_report(&report, Some(&path)).unwrap();
        let loaded = storage::load_report(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.bankroll, dec!(1000));

        let ids: Vec<_> = loaded.recommendations.cards.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<_> = report.recommendations.cards.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, expected);
        assert_eq!(
            loaded.recommendations.total_staked(),
            report.recommendations.total_staked()
        );

        storage::delete_report(Some(&path)).unwrap();
    }
}
