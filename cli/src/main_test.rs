use super::*;
use clap::CommandFactory;
use http_primitives::RequestStep;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn watch_collects_labels_and_attributes() {
    let cli = Cli::try_parse_from([
        "yw-cli",
        "watch",
        "data",
        "--label",
        "EnvironmentStatusResponse",
        "--attr",
        "profile=default",
        "--count",
        "1",
    ])
    .expect("parses");
    let Command::Watch(args) = cli.command else { panic!("expected watch") };
    assert_eq!(args.channel, WatchChannel::Data);
    assert_eq!(args.labels, vec!["EnvironmentStatusResponse".to_owned()]);
    assert_eq!(args.attributes, vec![("profile".to_owned(), "default".to_owned())]);
    assert_eq!(args.count, Some(1));
}

#[test]
fn custom_command_defaults_to_get() {
    let cli = Cli::try_parse_from(["yw-cli", "command", "reset"]).expect("parses");
    let Command::Command(args) = cli.command else { panic!("expected command") };
    assert_eq!(args.name, "reset");
    assert_eq!(args.method, CommandMethod::Get);
    assert!(args.data.is_none());
}

#[test]
fn attribute_requires_key_and_equals() {
    assert_eq!(parse_attribute("a=b=c"), Ok(("a".to_owned(), "b=c".to_owned())));
    assert_eq!(parse_attribute("a="), Ok(("a".to_owned(), String::new())));
    assert!(parse_attribute("novalue").is_err());
    assert!(parse_attribute("=x").is_err());
}

#[test]
fn progress_lines_show_counts() {
    let event = RequestEvent {
        request_id: "file-1".into(),
        command_type: CommandType::Download,
        step: RequestStep::Transferring,
        transferred_count: 10,
        total_count: Some(40),
    };
    assert_eq!(render_progress(&event), "[file-1] transferring 10/40");

    let event = RequestEvent { total_count: None, step: RequestStep::Finished, ..event };
    assert_eq!(render_progress(&event), "[file-1] finished 10");
}
