// In-process interpreter tests: drive an Executor and inspect its state.

use marsh::error::Unwind;
use marsh::executor::Executor;

fn shell() -> Executor {
    let mut exec = Executor::default();
    exec.runtime
        .assign("PATH", "/usr/bin:/bin".to_string())
        .unwrap();
    exec
}

fn run(exec: &mut Executor, source: &str) -> i32 {
    match exec.run_string(source) {
        Ok(status) => status,
        Err(Unwind::Exit(status)) => status,
        Err(other) => panic!("unexpected unwind: {:?}", other),
    }
}

fn var(exec: &Executor, name: &str) -> Option<String> {
    exec.runtime.get(name)
}

#[test]
fn test_while_until_and_counters() {
    let mut exec = shell();
    run(&mut exec, "i=0; while [ $i -lt 5 ]; do i=$((i+1)); done");
    assert_eq!(var(&exec, "i").as_deref(), Some("5"));
    run(&mut exec, "until (( i == 0 )); do (( i-- )); done");
    assert_eq!(var(&exec, "i").as_deref(), Some("0"));
}

#[test]
fn test_nested_break_and_continue() {
    let mut exec = shell();
    let source = r#"
        out=
        for a in 1 2 3; do
            for b in x y z; do
                [ $b = y ] && continue
                [ $a = 2 ] && continue 2
                [ $a = 3 ] && break 2
                out="$out$a$b "
            done
        done
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "out").as_deref(), Some("1x 1z "));
}

#[test]
fn test_case_patterns() {
    let mut exec = shell();
    let source = r#"
        classify() {
            case $1 in
                [0-9]*) kind=number ;;
                *.rs|*.toml) kind=rust ;;
                "quoted*") kind=literal ;;
                *) kind=other ;;
            esac
        }
        classify 42; a=$kind
        classify main.rs; b=$kind
        classify 'quoted*'; c=$kind
        classify quotedx; d=$kind
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "a").as_deref(), Some("number"));
    assert_eq!(var(&exec, "b").as_deref(), Some("rust"));
    assert_eq!(var(&exec, "c").as_deref(), Some("literal"));
    assert_eq!(var(&exec, "d").as_deref(), Some("other"));
}

#[test]
fn test_dynamic_scope() {
    let mut exec = shell();
    let source = r#"
        x=global
        inner() { seen=$x; x=changed-by-inner; }
        outer() { local x=outer-local; inner; after=$x; }
        outer
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "seen").as_deref(), Some("outer-local"));
    assert_eq!(var(&exec, "after").as_deref(), Some("changed-by-inner"));
    assert_eq!(var(&exec, "x").as_deref(), Some("global"));
}

#[test]
fn test_scope_popped_on_error() {
    let mut exec = shell();
    run(&mut exec, "f() { local v=inside; return 1; }; f; g() { local w=1; ${missing:?gone}; }");
    assert!(var(&exec, "v").is_none());
    let depth = exec.runtime.scopes.depth();
    let _ = exec.run_string("g");
    assert_eq!(exec.runtime.scopes.depth(), depth);
    assert!(exec.runtime.call_stack.is_empty());
}

#[test]
fn test_recursion_limit() {
    let mut exec = shell();
    exec.runtime.call_stack.set_limit(50);
    let status = run(&mut exec, "down() { down; }; down; limit_status=$?; after=yes");
    assert_eq!(status, 0);
    assert_eq!(var(&exec, "limit_status").as_deref(), Some("1"));
    assert_eq!(var(&exec, "after").as_deref(), Some("yes"));
    assert!(exec.runtime.call_stack.is_empty());
}

#[test]
fn test_recursive_function() {
    let mut exec = shell();
    run(
        &mut exec,
        "fact() { if (( $1 <= 1 )); then r=1; else fact $(( $1 - 1 )); r=$(( r * $1 )); fi; }; \
         fact 10",
    );
    assert_eq!(var(&exec, "r").as_deref(), Some("3628800"));
}

#[test]
fn test_command_substitution_is_isolated() {
    let mut exec = shell();
    run(&mut exec, "x=1; y=$(x=2; echo $x); z=$( (exit 3) ; echo $?)");
    assert_eq!(var(&exec, "x").as_deref(), Some("1"));
    assert_eq!(var(&exec, "y").as_deref(), Some("2"));
    assert_eq!(var(&exec, "z").as_deref(), Some("3"));
}

#[test]
fn test_expansions_run_left_to_right() {
    let mut exec = shell();
    run(&mut exec, "n=0; w=$((n += 1))-$((n *= 10))-${m:=$n}");
    assert_eq!(var(&exec, "w").as_deref(), Some("1-10-10"));
    assert_eq!(var(&exec, "m").as_deref(), Some("10"));
}

#[test]
fn test_subshell_is_isolated() {
    let mut exec = shell();
    let status = run(&mut exec, "x=1; (x=2; exit 7)");
    assert_eq!(status, 7);
    assert_eq!(var(&exec, "x").as_deref(), Some("1"));
}

#[test]
fn test_arrays() {
    let mut exec = shell();
    let source = r#"
        a=(one "two words" three)
        a+=(four)
        a[10]=ten
        count=${#a[@]}
        second=${a[1]}
        keys="${!a[@]}"
        declare -A m=([red]=1 [green]=2)
        m[blue]=3
        mkeys="${!m[@]}"
        msize=${#m[@]}
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "count").as_deref(), Some("5"));
    assert_eq!(var(&exec, "second").as_deref(), Some("two words"));
    assert_eq!(var(&exec, "keys").as_deref(), Some("0 1 2 3 10"));
    assert_eq!(var(&exec, "mkeys").as_deref(), Some("red green blue"));
    assert_eq!(var(&exec, "msize").as_deref(), Some("3"));
}

#[test]
fn test_parameter_operators() {
    let mut exec = shell();
    let source = r#"
        path=/usr/local/lib/file.tar.gz
        base=${path##*/}
        dir=${path%/*}
        ext=${path#*.}
        short=${path%%.*}
        rep=${path//l/L}
        len=${#path}
        sub=${path:5:5}
        up=${base^^}
        empty=
        d1=${empty:-dflt}
        d2=${empty-dflt}
        : ${assigned:=set-now}
        alt=${path:+yes}
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "base").as_deref(), Some("file.tar.gz"));
    assert_eq!(var(&exec, "dir").as_deref(), Some("/usr/local/lib"));
    assert_eq!(var(&exec, "ext").as_deref(), Some("tar.gz"));
    assert_eq!(var(&exec, "short").as_deref(), Some("/usr/local/lib/file"));
    assert_eq!(var(&exec, "rep").as_deref(), Some("/usr/LocaL/Lib/fiLe.tar.gz"));
    assert_eq!(var(&exec, "len").as_deref(), Some("26"));
    assert_eq!(var(&exec, "sub").as_deref(), Some("local"));
    assert_eq!(var(&exec, "up").as_deref(), Some("FILE.TAR.GZ"));
    assert_eq!(var(&exec, "d1").as_deref(), Some("dflt"));
    assert_eq!(var(&exec, "d2").as_deref(), Some(""));
    assert_eq!(var(&exec, "assigned").as_deref(), Some("set-now"));
    assert_eq!(var(&exec, "alt").as_deref(), Some("yes"));
}

#[test]
fn test_field_splitting_and_quoted_at() {
    let mut exec = shell();
    let source = r#"
        set -- "a b" c
        n1=0; for w in "$@"; do n1=$((n1+1)); done
        n2=0; for w in $@; do n2=$((n2+1)); done
        n3=0; for w in "$*"; do n3=$((n3+1)); done
        IFS=:; list=x:y::z; n4=0; for w in $list; do n4=$((n4+1)); done
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "n1").as_deref(), Some("2"));
    assert_eq!(var(&exec, "n2").as_deref(), Some("3"));
    assert_eq!(var(&exec, "n3").as_deref(), Some("1"));
    assert_eq!(var(&exec, "n4").as_deref(), Some("4"));
}

#[test]
fn test_brace_and_tilde_expansion() {
    let mut exec = shell();
    exec.runtime.assign("HOME", "/home/marsh".to_string()).unwrap();
    run(&mut exec, "set -- x{a,b,c}y {1..3}; joined=\"$*\"; t=~/dir; q='~'");
    assert_eq!(var(&exec, "joined").as_deref(), Some("xay xby xcy 1 2 3"));
    assert_eq!(var(&exec, "t").as_deref(), Some("/home/marsh/dir"));
    assert_eq!(var(&exec, "q").as_deref(), Some("~"));
}

#[test]
fn test_conditional_command() {
    let mut exec = shell();
    let source = r#"
        s=hello.txt
        [[ $s == *.txt ]] && a=glob
        [[ $s == "*.txt" ]] || b=literal
        [[ $s =~ ^(he)llo ]] && c=${BASH_REMATCH[1]}
        [[ -n $s && ! -z $s ]] && d=both
        [[ 10 -gt 9 && abc < abd ]] && e=compare
    "#;
    run(&mut exec, source);
    assert_eq!(var(&exec, "a").as_deref(), Some("glob"));
    assert_eq!(var(&exec, "b").as_deref(), Some("literal"));
    assert_eq!(var(&exec, "c").as_deref(), Some("he"));
    assert_eq!(var(&exec, "d").as_deref(), Some("both"));
    assert_eq!(var(&exec, "e").as_deref(), Some("compare"));
}

#[test]
fn test_eval_and_aliases() {
    let mut exec = shell();
    run(&mut exec, "cmd='v=from-eval'; eval \"$cmd\"\nalias mark='marked=yes'\nmark\n");
    assert_eq!(var(&exec, "v").as_deref(), Some("from-eval"));
    assert_eq!(var(&exec, "marked").as_deref(), Some("yes"));
}

#[test]
fn test_prefix_assignment_scope() {
    let mut exec = shell();
    run(&mut exec, "show() { inside=$TEMPVAR; }; TEMPVAR=t show; P=persist");
    assert_eq!(var(&exec, "inside").as_deref(), Some("t"));
    assert!(var(&exec, "TEMPVAR").is_none());
    assert_eq!(var(&exec, "P").as_deref(), Some("persist"));
}

#[test]
fn test_exit_unwinds_everything() {
    let mut exec = shell();
    let result = exec.run_string("f() { while true; do exit 6; done; }; f; after=1");
    assert!(matches!(result, Err(Unwind::Exit(6))));
    assert!(var(&exec, "after").is_none());
}
