use ppo_ewc::simulation::Trainer;
use ppo_ewc::TrainConfig;
use std::fs;

fn episode_config(use_eval: bool) -> TrainConfig {
    // Episodes are truncated after 1000 steps so one epoch ends every slot's episode once.
    TrainConfig {
        seed: 1,
        num_envs: 2,
        steps_per_epoch: 2000,
        total_steps: 2000,
        hidden_sizes: vec![8],
        batch_size: 500,
        learning_iters: 2,
        tasks: vec![0, 1],
        task_length: 2000,
        use_eval,
        write_terminal: false,
        ..TrainConfig::default()
    }
}

#[test]
fn writes_run_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = Trainer::new(episode_config(true), dir.path()).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.epochs, 1);
    assert_eq!(summary.total_steps, 2000);
    assert_eq!(summary.episodes, 2);
    assert_eq!(summary.rows_logged, 1);
    assert_eq!(summary.consolidations, 1);
    assert!(summary.last_stop_iter >= 1 && summary.last_stop_iter <= 2);

    let saved = TrainConfig::from_json_file(dir.path().join("config.json")).unwrap();
    assert_eq!(saved, episode_config(true));

    let progress = fs::read_to_string(dir.path().join("progress.csv")).unwrap();
    let lines: Vec<_> = progress.lines().collect();
    assert_eq!(lines.len(), 2);
    let header: Vec<_> = lines[0].split(',').collect();
    for key in [
        "Metrics/EpRet",
        "Metrics/EpLen",
        "Metrics/NominalEvalEpRet",
        "Metrics/LegEvalEpCost",
        "Train/StopIter",
        "Loss/Loss_ewc",
        "EWC/TaskIndex",
    ] {
        assert!(header.contains(&key), "missing column {}", key);
    }
    let row: Vec<_> = lines[1].split(',').collect();
    assert_eq!(row.len(), header.len());
    let ep_len = header.iter().position(|&k| k == "Metrics/EpLen").unwrap();
    assert_eq!(row[ep_len].parse::<f64>().unwrap(), 1000.0);

    assert!(dir.path().join("torch_save/model0.pt").is_file());
    assert!(dir.path().join("torch_save/state0.json").is_file());
}
