// Lexer and parser behaviour exercised through the public API.

use marsh::lexer::{LexMode, Lexer};
use marsh::parser::ast::*;
use marsh::parser::Parser;
use std::collections::HashMap;

fn parse(source: &str) -> List {
    let stream = Lexer::tokenize(source, LexMode::Strict).expect("lex");
    Parser::new(stream.tokens).parse_program().expect("parse")
}

fn first_command(list: &List) -> &Command {
    &list.items[0].and_or.first.stages[0].command
}

#[test]
fn test_list_structure() {
    let list = parse("a && b || c; d & e | f |& g");
    assert_eq!(list.items.len(), 3);
    assert_eq!(list.items[0].and_or.rest.len(), 2);
    assert_eq!(list.items[0].and_or.rest[0].0, Connector::And);
    assert!(list.items[1].background);
    let pipeline = &list.items[2].and_or.first;
    assert_eq!(pipeline.stages.len(), 3);
    assert!(!pipeline.stages[0].pipe_stderr);
    assert!(pipeline.stages[1].pipe_stderr);
}

#[test]
fn test_compound_commands() {
    let list = parse(
        "if a; then b; elif c; then d; else e; fi\nwhile x; do y; done\n\
         for i in 1 2; do :; done\ncase $v in a|b) x ;& *) y ;; esac\n",
    );
    assert_eq!(list.items.len(), 4);
    match first_command(&list) {
        Command::Compound(CompoundCommand::If { branches, else_branch }, _) => {
            assert_eq!(branches.len(), 2);
            assert!(else_branch.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
    match &list.items[3].and_or.first.stages[0].command {
        Command::Compound(CompoundCommand::Case { arms, .. }, _) => {
            assert_eq!(arms.len(), 2);
            assert_eq!(arms[0].patterns.len(), 2);
            assert_eq!(arms[0].terminator, CaseTerminator::FallThrough);
        }
        other => panic!("expected case, got {:?}", other),
    }
}

#[test]
fn test_function_definitions() {
    let list = parse("greet() { echo hi; }\nfunction other { :; }\n");
    let names: Vec<&str> = list
        .items
        .iter()
        .map(|item| match &item.and_or.first.stages[0].command {
            Command::FunctionDef(def) => def.name.as_str(),
            other => panic!("expected function, got {:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["greet", "other"]);
}

#[test]
fn test_redirects_and_assignments() {
    let list = parse("A=1 B+=2 arr=(x y) cmd 2>err <in >>out");
    let Command::Simple(simple) = first_command(&list) else {
        panic!("expected simple command");
    };
    assert_eq!(simple.assignments.len(), 3);
    assert!(simple.assignments[1].append);
    assert!(matches!(
        simple.assignments[2].value,
        AssignValue::Array(ref items) if items.len() == 2
    ));
    let kinds: Vec<(i32, RedirectKind)> =
        simple.redirects.iter().map(|r| (r.fd(), r.kind)).collect();
    assert_eq!(
        kinds,
        vec![(2, RedirectKind::Output), (0, RedirectKind::Input), (1, RedirectKind::Append)]
    );
}

#[test]
fn test_arith_and_cond_commands() {
    let list = parse(
        "(( x = 1 + 2 ))\n[[ -f file && $a == b* ]]\nfor ((i = 0; i < 3; i++)); do :; done\n",
    );
    assert!(matches!(first_command(&list), Command::Compound(CompoundCommand::Arith(_), _)));
    match &list.items[1].and_or.first.stages[0].command {
        Command::Compound(CompoundCommand::Cond(CondExpr::And(left, right)), _) => {
            assert!(matches!(**left, CondExpr::Unary(ref op, _) if op == "-f"));
            assert!(matches!(**right, CondExpr::Binary(_, ref op, _) if op == "=="));
        }
        other => panic!("expected [[ ]], got {:?}", other),
    }
    assert!(matches!(
        &list.items[2].and_or.first.stages[0].command,
        Command::Compound(CompoundCommand::CFor { .. }, _)
    ));
}

#[test]
fn test_incomplete_input_is_flagged() {
    for source in ["if true; then", "echo 'open", "f() {", "a &&", "case x in"] {
        let incomplete = match Lexer::tokenize(source, LexMode::Lenient) {
            Ok(stream) if stream.incomplete => true,
            Ok(stream) => match Parser::new(stream.tokens).parse_program() {
                Err(err) => err.incomplete,
                Ok(_) => false,
            },
            Err(_) => false,
        };
        assert!(incomplete, "{:?} should be incomplete", source);
    }
}

#[test]
fn test_hard_syntax_errors() {
    for source in ["fi", "do echo", "a | | b", "( )"] {
        let stream = Lexer::tokenize(source, LexMode::Strict).unwrap();
        let err = Parser::new(stream.tokens).parse_program().unwrap_err();
        assert!(!err.incomplete, "{:?} should be a hard error", source);
    }
}

#[test]
fn test_alias_expansion() {
    let mut aliases = HashMap::new();
    aliases.insert("ll".to_string(), "ls -l".to_string());
    aliases.insert("loop".to_string(), "loop x".to_string());
    let stream = Lexer::tokenize("ll dir; loop", LexMode::Strict).unwrap();
    let list = Parser::new(stream.tokens).with_aliases(&aliases).parse_program().unwrap();
    let Command::Simple(simple) = first_command(&list) else {
        panic!("expected simple command");
    };
    let words: Vec<&str> = simple.words.iter().map(|w| w.raw.as_str()).collect();
    assert_eq!(words, vec!["ls", "-l", "dir"]);
    let Command::Simple(second) = &list.items[1].and_or.first.stages[0].command else {
        panic!("expected simple command");
    };
    assert_eq!(second.words.len(), 2);
}

#[test]
fn test_positions_are_tracked() {
    let list = parse("echo a\n  echo b\n");
    let Command::Simple(second) = &list.items[1].and_or.first.stages[0].command else {
        panic!("expected simple command");
    };
    assert_eq!(second.pos.line, 2);
    assert_eq!(second.pos.column, 3);
}
