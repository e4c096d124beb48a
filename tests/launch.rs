use std::time::{Duration, Instant};

use colosseum::{
    games::{
        dots_and_boxes::{DnbSettings, DotsAndBoxes},
        guess_the_number::{GtnSettings, GuessTheNumber},
    },
    prelude::*,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn init_test_logger() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn bot(name: &str, program: &str) -> BotSpec {
    BotSpec::new(name, program)
}

fn config() -> Configuration {
    Configuration::new().with_verbose(false)
}

fn limits(move_timeout: Duration) -> Limits {
    LimitsBuilder::new()
        .with_total_cpu_count(1)
        .with_move_timeout(move_timeout)
        .with_stop_grace(Duration::from_millis(100))
        .build()
        .unwrap()
}

#[test]
fn binary_search_beats_linear_guessing() {
    init_test_logger();
    let bots = vec![
        bot("linear", env!("CARGO_BIN_EXE_linear-bot")),
        bot("binary", env!("CARGO_BIN_EXE_binary-bot")),
    ];
    let mut hoster = GameHoster::new(
        GuessTheNumber::with_seed(2024),
        bots,
        config(),
        limits(Duration::from_secs(5)),
    )
    .unwrap()
    .with_seed(7);

    let settings = GtnSettings {
        lower: 0,
        upper: 100,
    };
    // ceil(log2(100)) + 1 turns for the binary searcher, interleaved with the other seat
    let max_moves = 2 * (7 + 1);
    for _ in 0..1000 {
        let report = hoster.start_game(&settings).unwrap();
        assert_eq!(report.end, MatchEnd::Finished);
        assert!(report.forfeits.is_empty());
        assert!(report.moves <= max_moves, "{} moves", report.moves);
        assert_eq!(report.points.iter().sum::<u32>(), 1);
    }

    assert_eq!(hoster.games_played(), 1000);
    let totals = hoster.total_points();
    assert_eq!(totals.iter().sum::<u64>(), 1000);
    assert!(totals[1] > totals[0], "binary {} vs linear {}", totals[1], totals[0]);
    assert_eq!(hoster.ranking()[0].0, "binary");
}

#[test]
fn random_bots_fill_a_small_board() {
    init_test_logger();
    let program = env!("CARGO_BIN_EXE_dnb-random-bot");
    let bots = vec![
        bot("first", program).with_args(["1"]),
        bot("second", program).with_args(["2"]),
    ];
    let mut hoster = GameHoster::new(
        DotsAndBoxes::new(),
        bots,
        config(),
        limits(Duration::from_secs(5)),
    )
    .unwrap();

    let n = 3;
    for _ in 0..20 {
        let report = hoster.start_game(&DnbSettings { n }).unwrap();
        assert_eq!(report.end, MatchEnd::Finished);
        assert_eq!(report.moves, 2 * (n - 1) * (n - 2));
        assert_eq!(report.points.iter().sum::<u32>(), ((n - 2) * (n - 2)) as u32);
        assert_eq!(report.points, report.tracker_points);
    }
    assert_eq!(hoster.total_points().iter().sum::<u64>(), 20);
}

#[test]
fn malformed_move_ends_the_match() {
    init_test_logger();
    let bots = vec![
        bot("faulty", env!("CARGO_BIN_EXE_faulty-bot")).with_args(["missing-field", "1"]),
        bot("random", env!("CARGO_BIN_EXE_dnb-random-bot")),
    ];
    let mut hoster = GameHoster::new(
        DotsAndBoxes::new(),
        bots,
        config(),
        limits(Duration::from_secs(5)),
    )
    .unwrap();

    for _ in 0..5 {
        let report = hoster.start_game(&DnbSettings { n: 5 }).unwrap();
        assert_eq!(report.end, MatchEnd::Forfeit);
        assert_eq!(report.forfeits, vec![(0, ForfeitReason::Malformed)]);
        assert_eq!(report.points[0], 0);
        assert_eq!(report.points[1], report.tracker_points[1]);
    }
    assert_eq!(hoster.total_points()[0], 0);
}

#[test]
fn silent_bot_times_out() {
    init_test_logger();
    let timeout = Duration::from_millis(200);
    let bots = vec![
        bot("silent", env!("CARGO_BIN_EXE_faulty-bot")).with_args(["silent"]),
        bot("random", env!("CARGO_BIN_EXE_dnb-random-bot")),
    ];
    let mut hoster =
        GameHoster::new(DotsAndBoxes::new(), bots, config(), limits(timeout)).unwrap();

    let start = Instant::now();
    let report = hoster.start_game(&DnbSettings { n: 4 }).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.end, MatchEnd::Forfeit);
    assert_eq!(report.forfeits, vec![(0, ForfeitReason::Timeout)]);
    assert_eq!(report.points[0], 0);
    assert!(elapsed >= timeout, "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[test]
fn crashed_bot_is_replaced_for_the_next_match() {
    init_test_logger();
    let bots = vec![
        bot("crashing", env!("CARGO_BIN_EXE_faulty-bot")).with_args(["crash"]),
        bot("random", env!("CARGO_BIN_EXE_dnb-random-bot")),
    ];
    let mut hoster = GameHoster::new(
        DotsAndBoxes::new(),
        bots,
        config(),
        limits(Duration::from_secs(5)),
    )
    .unwrap();

    for _ in 0..3 {
        let report = hoster.start_game(&DnbSettings { n: 4 }).unwrap();
        assert_eq!(report.forfeits, vec![(0, ForfeitReason::PeerTerminated)]);
    }
    assert_eq!(hoster.games_played(), 3);
}

#[test]
fn excluded_seats_let_the_others_finish() {
    init_test_logger();
    let bots = vec![
        bot("broken", env!("CARGO_BIN_EXE_dnb-random-bot")),
        bot("binary", env!("CARGO_BIN_EXE_binary-bot")),
        bot("linear", env!("CARGO_BIN_EXE_linear-bot")),
    ];
    let mut hoster = GameHoster::new(
        GuessTheNumber::with_seed(1),
        bots,
        config(),
        limits(Duration::from_secs(5)),
    )
    .unwrap();

    for _ in 0..10 {
        let report = hoster.start_game(&GtnSettings::default()).unwrap();
        assert_eq!(report.end, MatchEnd::Finished);
        assert_eq!(report.points[0], 0);
        assert_eq!(report.points.iter().sum::<u32>(), 1);
        // a dots and boxes bot cannot even read guess the number parameters,
        // it only escapes a forfeit when the match ends before its first turn
        assert!(matches!(
            report.forfeits.as_slice(),
            [] | [(0, ForfeitReason::PeerTerminated)] | [(0, ForfeitReason::Unavailable)]
        ));
    }
}

#[cfg(unix)]
#[test]
fn bot_that_never_reads_cannot_stall_the_tournament() {
    use std::{sync::mpsc, thread};

    init_test_logger();
    let matches = 100;
    let (done, finished) = mpsc::channel();
    thread::spawn(move || {
        let bots = vec![
            bot("deaf", "sleep").with_args(["1000"]),
            bot("linear", env!("CARGO_BIN_EXE_linear-bot")),
        ];
        let limits = LimitsBuilder::new()
            .with_total_cpu_count(1)
            .with_move_timeout(Duration::from_millis(50))
            .with_stop_grace(Duration::from_millis(10))
            .build()
            .unwrap();
        let mut hoster = GameHoster::new(
            GuessTheNumber::with_seed(9),
            bots,
            config().with_shuffle_seats(false),
            limits,
        )
        .unwrap();
        let mut deaf_timeouts = 0;
        for _ in 0..matches {
            let report = hoster.start_game(&GtnSettings::default()).unwrap();
            if report.forfeits.first() == Some(&(0, ForfeitReason::Timeout)) {
                deaf_timeouts += 1;
            }
        }
        let _ = done.send((hoster.games_played(), deaf_timeouts));
    });

    let (played, deaf_timeouts) = finished
        .recv_timeout(Duration::from_secs(120))
        .expect("tournament did not finish");
    assert_eq!(played, matches);
    assert_eq!(deaf_timeouts, matches);
}

/// Answers its first turn request 300 ms late, every later one at once.
#[cfg(unix)]
const LATE_FIRST_ANSWER: &str = r#"first=1
while read -r line; do
  case "$line" in
    *your_turn*)
      if [ "$first" = 1 ]; then
        first=0
        sleep 0.3
        echo '{"late": true}'
      else
        echo '{"guess": 0}'
      fi ;;
  esac
done"#;

#[cfg(unix)]
#[test]
fn late_answer_is_not_played_in_the_next_match() {
    init_test_logger();
    let bots = vec![
        bot("late", "sh").with_args(["-c", LATE_FIRST_ANSWER]),
        bot("linear", env!("CARGO_BIN_EXE_linear-bot")),
    ];
    let mut hoster = GameHoster::new(
        GuessTheNumber::with_seed(4),
        bots,
        config().with_shuffle_seats(false),
        limits(Duration::from_millis(200)),
    )
    .unwrap()
    .with_forfeit_policy(ForfeitPolicy::EndMatch);

    for _ in 0..3 {
        let report = hoster.start_game(&GtnSettings::default()).unwrap();
        assert_eq!(report.end, MatchEnd::Forfeit);
        assert_eq!(report.forfeits, vec![(0, ForfeitReason::Timeout)]);
    }
}
