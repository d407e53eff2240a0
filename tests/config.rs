mod common;

use common::{AbsolutePaths, Accounts};
use pretty_assertions::assert_eq;
use runas::config::{self, Line, Origin, RuleLine};
use runas::Error;

fn rules_of(text: &str) -> Vec<runas::Rule> {
    config::parse_rules(text, &Accounts::new(), &AbsolutePaths).unwrap()
}

#[test]
fn test_config_line_parser_simple() {
    let simple = include_str!("configs/simple_runas.conf");
    let (rem, rule) = config::rule_line_parser(simple.lines().next().unwrap()).unwrap();

    assert_eq!(rem, "");
    assert_eq!(
        rule,
        RuleLine {
            origin: Origin::User("alice".into()),
            target_user: "bob".into(),
            target_group: None,
            command: "/bin/ls".into(),
            args: None,
        }
    );

    let rules = rules_of(simple);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].origin().name, "alice");
    assert_eq!(rules[0].target_user().name, "bob");
    assert_eq!(rules[0].target_group().name, "bob");
    assert_eq!(rules[0].command().path(), "/bin/ls");
    assert_eq!(rules[0].command().args(), None);
}

#[test]
fn test_config_line_parser_target() {
    let target = include_str!("configs/target_runas.conf");
    let rules = rules_of(target);

    assert_eq!(rules.len(), 3);

    assert_eq!(rules[0].target_user().uid, 0);
    assert_eq!(rules[0].target_group().gid, 0);

    assert_eq!(rules[1].target_user().name, "bob");
    assert_eq!(rules[1].target_group().name, "staff");

    // numeric ids resolve to the same accounts as names
    assert_eq!(rules[2].origin(), rules[0].origin());
    assert_eq!(rules[2].target_user(), rules[0].target_user());
    assert_eq!(rules[2].target_group(), rules[0].target_group());
}

#[test]
fn test_config_line_parser_cmd() {
    let cmd = include_str!("configs/cmd_runas.conf");
    let lines: Vec<Line> = cmd
        .lines()
        .map(|l| config::parse_line(l).unwrap())
        .collect();

    let args: Vec<Option<&str>> = lines
        .iter()
        .map(|l| match l {
            Line::Rule(r) => r.args.as_deref(),
            other => panic!("expected a rule, got {:?}", other),
        })
        .collect();
    assert_eq!(
        args,
        vec![Some("secret.txt"), Some("restart nginx"), None]
    );

    let rules = rules_of(cmd);
    assert_eq!(rules[0].command().path(), "/bin/cat");
    assert_eq!(rules[1].command().path(), "/usr/bin/systemctl");
    assert_eq!(rules[2].command().args(), None);
}

#[test]
fn test_config_group_expansion() {
    let rules = rules_of(include_str!("configs/group_runas.conf"));

    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].origin().name, "alice");
    assert_eq!(rules[1].origin().name, "bob");
    for rule in &rules {
        assert_eq!(rule.target_user().name, "root");
        assert_eq!(rule.target_group().name, "root");
        assert_eq!(rule.command().path(), "/usr/bin/id");
    }
}

#[test]
fn test_config_full() {
    let rules = rules_of(include_str!("configs/full_runas.conf"));
    let summary: Vec<(&str, &str, &str)> = rules
        .iter()
        .map(|r| {
            (
                r.origin().name.as_str(),
                r.target_user().name.as_str(),
                r.command().path(),
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            ("alice", "root", "/usr/bin/id"),
            ("alice", "bob", "/bin/ls"),
            ("alice", "bob", "/bin/cat"),
            ("bob", "bob", "/bin/cat"),
            ("carol", "bob", "/bin/cat"),
        ]
    );
    assert_eq!(rules[4].command().args(), Some("/var/log/*.log"));
}

#[test]
fn test_config_malformed_aborts() {
    let res = config::parse_rules(
        include_str!("configs/malformed_runas.conf"),
        &Accounts::new(),
        &AbsolutePaths,
    );
    match res {
        Err(Error::ConfigParse { line, .. }) => assert_eq!(line, "alice => bob :: /bin/cat"),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_config_unknown_accounts() {
    let accounts = Accounts::new();
    let err = config::parse_rules("%wheel -> root :: /bin/sh\n", &accounts, &AbsolutePaths)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "config error - group 'wheel' doesn't exist [%wheel -> root :: /bin/sh]"
    );

    let err = config::parse_rules("alice -> bob :: sh\n", &accounts, &AbsolutePaths).unwrap_err();
    assert_eq!(
        err.to_string(),
        "config error - command path is not absolute: sh [alice -> bob :: sh]"
    );
}
