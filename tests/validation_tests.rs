//! Schema validation with the built-in checks

use nestini::{
    ConfigObj, ConfigObjError, Options, Outcome, Section, ValidateOptions, ValidationError,
    Validator, Value, flatten_errors,
};

fn config_with_spec(data: &str, spec: &str) -> ConfigObj {
    ConfigObj::from_lines(data.split('\n'), Options::default())
        .unwrap()
        .with_configspec(spec.split('\n'))
        .unwrap()
}

fn empty_with_spec(spec: &str) -> ConfigObj {
    ConfigObj::new().with_configspec(spec.split('\n')).unwrap()
}

fn validate(config: &mut ConfigObj) -> Outcome {
    config
        .validate(&Validator::new(), ValidateOptions::default())
        .unwrap()
}

fn at<'a>(config: &'a ConfigObj, path: &[&str]) -> &'a Section {
    path.iter().fold(config.root(), |section, name| {
        section.section(name).unwrap()
    })
}

const NESTED_DATA: &str = "
        test1=40
        test2=hello
        test3=3
        test4=5.0
        [section]
            test1=40
            test2=hello
            test3=3
            test4=5.0
            [[sub section]]
                test1=40
                test2=hello
                test3=3
                test4=5.0
        ";

const NESTED_SPEC: &str = "
        test1= integer(30,50)
        test2= string
        test3=integer
        test4=float(6.0)
        [section ]
            test1=integer(30,50)
            test2=string
            test3=integer
            test4=float(6.0)
            [[sub section]]
                test1=integer(30,50)
                test2=string
                test3=integer
                test4=float(6.0)
        ";

fn level(with_child: Option<(&str, Outcome)>) -> Outcome {
    let mut map = indexmap::IndexMap::new();
    map.insert("test1".to_string(), Outcome::Valid);
    map.insert("test2".to_string(), Outcome::Valid);
    map.insert("test3".to_string(), Outcome::Valid);
    map.insert("test4".to_string(), Outcome::Invalid);
    if let Some((name, outcome)) = with_child {
        map.insert(name.to_string(), outcome);
    }
    Outcome::Section(map)
}

#[test]
fn test_mixed_outcome_tree() {
    let mut config = config_with_spec(NESTED_DATA, NESTED_SPEC);
    let outcome = validate(&mut config);
    let expected = level(Some(("section", level(Some(("sub section", level(None)))))));
    assert_eq!(outcome, expected);

    assert_eq!(config.root().value("test1"), Some(&Value::Integer(40)));
    assert_eq!(
        at(&config, &["section", "sub section"]).value("test4"),
        Some(&Value::from("5.0"))
    );
}

#[test]
fn test_conversions_and_changed_values() {
    let data = "
            key = 0
            key2 = 1.1
            [section]
            key = some text
            key2 = 1.1, 3.0, 17, 6.8
                [[sub-section]]
                key = option1
                key2 = True";
    let spec = "
            key = integer
            key2 = float
            [section]
            key = string
            key2 = float_list(4)
               [[sub-section]]
               key = option(option1, option2)
               key2 = boolean";
    let mut config = config_with_spec(data, spec);
    assert!(validate(&mut config).is_valid());
    assert_eq!(
        at(&config, &["section"]).value("key2"),
        Some(&Value::list(vec![1.1, 3.0, 17.0, 6.8]))
    );
    assert_eq!(
        at(&config, &["section", "sub-section"]).value("key2"),
        Some(&Value::Boolean(true))
    );

    config.insert("key", "text not a digit");
    let outcome = validate(&mut config);
    assert_eq!(outcome.get("key"), Some(&Outcome::Invalid));
    assert_eq!(outcome.get("key2"), Some(&Outcome::Valid));
    assert_eq!(outcome.get("section"), Some(&Outcome::Valid));
}

const DEFAULTS_SPEC: &str = "
            test1=integer(30,50, default=40)
            test2=string(default=\"hello\")
            test3=integer(default=3)
            test4=float(6.0, default=6.0)
            [section ]
                test1=integer(30,50, default=40)
                test2=string(default=\"hello\")
                test3=integer(default=3)
                test4=float(6.0, default=6.0)
                [[sub section]]
                    test1=integer(30,50, default=40)
                    test2=string(default=\"hello\")
                    test3=integer(default=3)
                    test4=float(6.0, default=6.0)
            ";

#[test]
fn test_defaults_are_injected_and_recorded() {
    let mut config = ConfigObj::from_lines(["test1=30"], Options::default())
        .unwrap()
        .with_configspec(DEFAULTS_SPEC.split('\n'))
        .unwrap();
    assert!(config.root().defaults.is_empty());
    assert!(config.root().default_values.is_empty());

    assert!(validate(&mut config).is_valid());

    let root = config.root();
    assert_eq!(root.value("test1"), Some(&Value::Integer(30)));
    assert_eq!(root.value("test2"), Some(&Value::from("hello")));
    assert_eq!(root.value("test3"), Some(&Value::Integer(3)));
    assert_eq!(root.value("test4"), Some(&Value::Float(6.0)));
    assert_eq!(root.defaults, ["test2", "test3", "test4"]);
    assert_eq!(root.default_values.get("test1"), Some(&Value::Integer(40)));
    assert_eq!(root.default_values.len(), 4);

    let sub = at(&config, &["section", "sub section"]);
    assert_eq!(sub.value("test1"), Some(&Value::Integer(40)));
    assert!(sub.was_created());

    let root = config.root_mut();
    assert_eq!(root.restore_default("test1").unwrap(), Value::Integer(40));
    assert_eq!(root.value("test1"), Some(&Value::Integer(40)));
    assert!(root.defaults.iter().any(|k| k == "test1"));
}

#[test]
fn test_walk_then_restore_defaults() {
    let mut config = empty_with_spec(DEFAULTS_SPEC);
    assert!(validate(&mut config).is_valid());

    config
        .root_mut()
        .walk(false, &mut |section: &mut Section, key: &str| {
            section.insert(key, Value::Integer(3));
            Ok::<(), ()>(())
        })
        .unwrap();
    assert_eq!(
        at(&config, &["section", "sub section"]).value("test4"),
        Some(&Value::Integer(3))
    );

    config.restore_defaults();
    let sub = at(&config, &["section", "sub section"]);
    assert_eq!(sub.value("test2"), Some(&Value::from("hello")));
    assert_eq!(sub.value("test4"), Some(&Value::Float(6.0)));
}

#[test]
fn test_failing_default_still_recorded() {
    let mut config = ConfigObj::from_lines(["foo = fish"], Options::default())
        .unwrap()
        .with_configspec(["foo = integer(default=3)"])
        .unwrap();
    assert!(validate(&mut config).is_invalid());
    assert_eq!(config.root().value("foo"), Some(&Value::from("fish")));
    assert_eq!(
        config.root().default_values.get("foo"),
        Some(&Value::Integer(3))
    );
    assert_eq!(
        config.root_mut().restore_default("foo").unwrap(),
        Value::Integer(3)
    );
}

const REPEATED_SPEC: &str = "
        [dogs]
            [[__many__]] # spec for a dog
                fleas = boolean(default=True)
                tail = option(long, short, default=long)
                name = string(default=rover)
                [[[__many__]]]  # spec for a puppy
                    name = string(default=\"son of rover\")
                    age = float(default=0.0)
        [cats]
            [[__many__]] # spec for a cat
                fleas = boolean(default=True)
                tail = option(long, short, default=short)
                name = string(default=pussy)
                [[[__many__]]] # spec for a kitten
                    name = string(default=\"son of pussy\")
                    age = float(default=0.0)
                ";

#[test]
fn test_repeated_sections_with_children() {
    let data = "
        [dogs]

            # blank dogs with puppies
            # should be filled in by the configspec
            [[dog1]]
                [[[puppy1]]]
                [[[puppy2]]]
            [[dog2]]
                [[[puppy1]]]
        [cats]
            [[cat1]]
                [[[kitten1]]]
        ";
    let mut config = config_with_spec(data, REPEATED_SPEC);
    assert!(validate(&mut config).is_valid());

    let dog = at(&config, &["dogs", "dog2"]);
    assert_eq!(dog.value("fleas"), Some(&Value::Boolean(true)));
    assert_eq!(dog.value("tail"), Some(&Value::from("long")));
    assert_eq!(dog.value("name"), Some(&Value::from("rover")));
    let puppy = at(&config, &["dogs", "dog1", "puppy2"]);
    assert_eq!(puppy.value("name"), Some(&Value::from("son of rover")));
    assert_eq!(puppy.value("age"), Some(&Value::Float(0.0)));
    let kitten = at(&config, &["cats", "cat1", "kitten1"]);
    assert_eq!(kitten.value("name"), Some(&Value::from("son of pussy")));
    assert_eq!(at(&config, &["cats", "cat1"]).value("tail"), Some(&Value::from("short")));
}

#[test]
fn test_top_level_wildcard_section() {
    let spec = "
        [__many__]

            name = string(default=Michael)
            age = float(default=0.0)
            sex = option(m, f, default=m)
        ";
    let mut config = empty_with_spec(spec);
    config.insert("Michael", Section::new());
    assert!(validate(&mut config).is_valid());

    let expected: Section = [
        ("age", Value::Float(0.0)),
        ("name", Value::from("Michael")),
        ("sex", Value::from("m")),
    ]
    .into_iter()
    .collect();
    assert_eq!(at(&config, &["Michael"]), &expected);
    assert!(!config.root().contains_key("__many__"));
}

#[test]
fn test_deep_schema_under_wildcard() {
    let data = "
        [dogs]
            [[dog1]]
        [cats]
            [[cat1]]
            [[cat2]]
        ";
    let spec = "
        [cats]
        [[__many__]]
            fleas = boolean(default=True)
            [[[description]]]
                height = float(default=3.3)
                weight = float(default=6)
                [[[[coat]]]]
                    fur = option(black, grey, brown, \"tortoise shell\", default=black)
                    condition = integer(0,10, default=5)
        ";
    let mut config = config_with_spec(data, spec);
    assert!(validate(&mut config).is_valid());

    assert!(at(&config, &["dogs", "dog1"]).is_empty());
    assert_eq!(config.root().extra_values, ["dogs"]);
    let coat = at(&config, &["cats", "cat2", "description", "coat"]);
    assert_eq!(coat.value("fur"), Some(&Value::from("black")));
    assert_eq!(coat.value("condition"), Some(&Value::Integer(5)));
    let description = at(&config, &["cats", "cat1", "description"]);
    assert_eq!(description.value("weight"), Some(&Value::Float(6.0)));
    assert_eq!(description.value("height"), Some(&Value::Float(3.3)));
}

#[test]
fn test_interpolation_survives_validation() {
    let mut config = empty_with_spec("test = string");
    let defaults: Section = [("def_test", "a")].into_iter().collect();
    config.insert("DEFAULT", defaults);
    config.insert("test", "%(def_test)s");
    assert_eq!(config.get("test").unwrap(), Some(Value::from("a")));

    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().value("test"), Some(&Value::from("%(def_test)s")));
}

#[test]
fn test_configspec_is_interpolated() {
    let spec = "interpolated string  = string(default=\"fuzzy-%(man)s\")\n[DEFAULT]\nman = wuzzy";
    let mut config = empty_with_spec(spec);
    assert!(validate(&mut config).is_valid());
    assert_eq!(
        config.root().value("interpolated string"),
        Some(&Value::from("fuzzy-wuzzy"))
    );
}

#[test]
fn test_hash_inside_default() {
    let mut config = empty_with_spec("stuff = string(default=\"#ff00dd\")");
    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().value("stuff"), Some(&Value::from("#ff00dd")));
}

fn describe(errors: &[nestini::FlatError]) -> Vec<String> {
    let mut lines: Vec<String> = errors
        .iter()
        .map(|entry| {
            let mut parts = vec!["[root]".to_string()];
            parts.extend(entry.sections.iter().cloned());
            parts.extend(entry.key.iter().cloned());
            let error = entry
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "missing".to_string());
            format!("{} = {}", parts.join(", "), error)
        })
        .collect();
    lines.sort();
    lines
}

#[test]
fn test_preserved_errors_flatten() {
    let data = "
            option1 = True
            [section1]
            option1 = True
            [section2]
            another_option = Probably
            [section3]
            another_option = True
            [[section3b]]
            value = 3
            value2 = a
            value3 = 11
            ";
    let spec = "
            option1 = boolean()
            option2 = boolean()
            option3 = boolean(default=Bad_value)
            [section1]
            option1 = boolean()
            option2 = boolean()
            option3 = boolean(default=Bad_value)
            [section2]
            another_option = boolean()
            [section3]
            another_option = boolean()
            [[section3b]]
            value = integer
            value2 = integer
            value3 = integer(0, 10)
                [[[section3b-sub]]]
                value = string
            [section4]
            another_option = boolean()
            ";
    let mut config = config_with_spec(data, spec);
    let outcome = config
        .validate(
            &Validator::new(),
            ValidateOptions::default().with_preserve_errors(true),
        )
        .unwrap();

    assert_eq!(
        describe(&flatten_errors(config.root(), &outcome)),
        [
            "[root], option2 = missing",
            "[root], option3 = the value \"Bad_value\" is of the wrong type.",
            "[root], section1, option2 = missing",
            "[root], section1, option3 = the value \"Bad_value\" is of the wrong type.",
            "[root], section2, another_option = the value \"Probably\" is of the wrong type.",
            "[root], section3, section3b, section3b-sub = missing",
            "[root], section3, section3b, value2 = the value \"a\" is of the wrong type.",
            "[root], section3, section3b, value3 = the value \"11\" is too big.",
            "[root], section4 = missing",
        ]
    );
}

#[test]
fn test_preserve_errors_on_created_sections() {
    let spec = "[section]\nfoo = integer";
    let preserve = ValidateOptions::default().with_preserve_errors(true);

    let mut config = empty_with_spec(spec);
    let outcome = config.validate(&Validator::new(), preserve).unwrap();
    assert_eq!(outcome.get("section"), Some(&Outcome::Invalid));

    let mut config = config_with_spec("[section]", spec);
    assert!(validate(&mut config).is_invalid());
    let outcome = config.validate(&Validator::new(), preserve).unwrap();
    assert_eq!(
        outcome.get("section").and_then(|s| s.get("foo")),
        Some(&Outcome::Invalid)
    );
}

#[test]
fn test_shape_mismatches() {
    let mut config = config_with_spec("cow = true", "[cow]\nsomething = boolean");
    assert!(validate(&mut config).is_invalid());

    let outcome = config
        .validate(
            &Validator::new(),
            ValidateOptions::default().with_preserve_errors(true),
        )
        .unwrap();
    let flat = flatten_errors(config.root(), &outcome);
    assert_eq!(flat.len(), 1);
    assert_eq!(
        flat[0].error.as_ref().map(ToString::to_string).as_deref(),
        Some("Section 'cow' was provided as a single value")
    );

    let mut config = config_with_spec("[something]\ncow = true", "something = boolean");
    assert!(validate(&mut config).is_invalid());
    let outcome = config
        .validate(
            &Validator::new(),
            ValidateOptions::default().with_preserve_errors(true),
        )
        .unwrap();
    let flat = flatten_errors(config.root(), &outcome);
    assert_eq!(
        flat[0].error.as_ref().map(ToString::to_string).as_deref(),
        Some("Value 'something' was provided as a section")
    );
}

#[test]
fn test_sections_without_schema_pass() {
    let mut config = config_with_spec("[cow]\ndog = true", "");
    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().extra_values, ["cow"]);
}

#[test]
fn test_wildcard_checks() {
    let mut config = config_with_spec("a = 6\nb = 7", "__many__ = integer()");
    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().value("b"), Some(&Value::Integer(7)));

    let mut config = config_with_spec("[name]\na = 6\nb = 7", "[name]\n__many__ = integer()");
    assert!(validate(&mut config).is_valid());
    assert_eq!(at(&config, &["name"]).value("a"), Some(&Value::Integer(6)));

    let mut config = config_with_spec(
        "[name]\nhello = 7\n[thing]\nfish = 0",
        "[__many__]\n__many__ = integer()",
    );
    assert!(validate(&mut config).is_valid());
    assert_eq!(at(&config, &["thing"]).value("fish"), Some(&Value::Integer(0)));
}

#[test]
fn test_trailing_underscore_wildcard() {
    let spec = "__many___ = integer\n[s]\n__many___ = integer";
    let mut config = config_with_spec("a = 6\n[s]\nb = 7", spec);
    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().value("a"), Some(&Value::Integer(6)));
    assert_eq!(at(&config, &["s"]).value("b"), Some(&Value::Integer(7)));
    assert!(config.root().extra_values.is_empty());
}

#[test]
fn test_wildcard_synonyms_at_several_levels() {
    let spec = "
        ___many___ = integer
        [__many__]
        ___many___ = boolean
        [[__many__]]
        __many__ = float
        ";
    let data = "
        fish = 8
        buggle = 4
        [hi]
        one = true
        two = false
        [[bye]]
        odd = 3
        whoops = 9.0
        [bye]
        one = true
        two = true
        [[lots]]
        odd = 3
        whoops = 9.0
        ";
    let mut config = config_with_spec(data, spec);
    assert!(validate(&mut config).is_valid());

    assert_eq!(config.root().value("fish"), Some(&Value::Integer(8)));
    assert_eq!(at(&config, &["hi"]).value("two"), Some(&Value::Boolean(false)));
    assert_eq!(at(&config, &["hi", "bye"]).value("odd"), Some(&Value::Float(3.0)));
    assert_eq!(at(&config, &["bye", "lots"]).value("whoops"), Some(&Value::Float(9.0)));
}

#[test]
fn test_named_and_wildcard_sections_together() {
    let spec = "[dog]\n[[cow]]\nsomething = boolean\n[[__many__]]\nfish = integer";
    let data = "[dog]\n[[cow]]\nsomething = true\n[[ob]]\nfish = 3\n[[bo]]\nfish = 6";
    let mut config = config_with_spec(data, spec);
    assert!(validate(&mut config).is_valid());
    assert_eq!(at(&config, &["dog", "cow"]).value("something"), Some(&Value::Boolean(true)));
    assert_eq!(at(&config, &["dog", "bo"]).value("fish"), Some(&Value::Integer(6)));
}

#[test]
fn test_validating_twice_is_stable() {
    let data = "count = 3\nratio = 0.5\nports = 80, 443\n[server]\nname = web";
    let spec = "
        count = integer
        ratio = float
        ports = int_list
        timeout = integer(default=30)
        [server]
        name = string
        [cache]
        size = integer(default=64)
        ";
    let mut config = config_with_spec(data, spec);

    assert_eq!(validate(&mut config), Outcome::Valid);
    let first = config.root().clone();
    assert_eq!(first.value("ports"), Some(&Value::list(vec![80i64, 443])));
    assert_eq!(first.value("timeout"), Some(&Value::Integer(30)));
    assert_eq!(at(&config, &["cache"]).value("size"), Some(&Value::Integer(64)));

    assert_eq!(validate(&mut config), Outcome::Valid);
    assert_eq!(config.root(), &first);
    assert_eq!(config.root().defaults, first.defaults);
    assert_eq!(at(&config, &["cache"]).defaults, ["size"]);
}

#[test]
fn test_extra_values() {
    let data = "bar = 3\n[something]\nfoo = fish\n[section]\nfoo=boo";
    let mut config = config_with_spec(data, "[section]");
    assert!(config.root().extra_values.is_empty());
    config.root_mut().extra_values = vec!["bar".into(), "gosh".into(), "what".into()];

    assert!(validate(&mut config).is_valid());
    assert_eq!(config.root().extra_values, ["bar", "something"]);
    assert_eq!(at(&config, &["section"]).extra_values, ["foo"]);
    assert!(at(&config, &["something"]).extra_values.is_empty());
}

#[test]
fn test_copy_mode() {
    let spec = "
# schema comment
[section]
[[__many__]]
# the value
value = string(default='nothing') # kept with the check
";
    let mut config = config_with_spec("[section]\n[[something]]", spec);
    config
        .validate(&Validator::new(), ValidateOptions::default().with_copy(true))
        .unwrap();

    let something = at(&config, &["section", "something"]);
    assert_eq!(something.value("value"), Some(&Value::from("nothing")));
    assert!(something.defaults.is_empty());
    assert_eq!(something.comments["value"], ["# the value"]);
    assert_eq!(config.initial_comment, ["", "# schema comment"]);
}

#[test]
fn test_fail_fast() {
    let mut config = config_with_spec("a = x\nb = 2", "a = integer\nb = integer");
    let result = config.validate(
        &Validator::new(),
        ValidateOptions::default().with_fail_fast(true),
    );
    assert!(matches!(
        result,
        Err(ConfigObjError::Validation(ValidationError::WrongType(ref v))) if v == "x"
    ));
}

#[test]
fn test_validate_requires_configspec() {
    let mut config = ConfigObj::new();
    assert!(matches!(
        config.validate(&Validator::new(), ValidateOptions::default()),
        Err(ConfigObjError::MissingConfigspec)
    ));
}

#[test]
fn test_repeated_wildcard_sections_rejected() {
    let result = ConfigObj::new().with_configspec(["[__many__]", "[___many___]"]);
    assert!(matches!(result, Err(ConfigObjError::RepeatSection { .. })));
}

#[test]
fn test_bad_configspec() {
    let result = ConfigObj::new().with_configspec(["a = 1", "a = 2"]);
    assert!(matches!(result, Err(ConfigObjError::Configspec(_))));
}

fn even(value: &Value, _: &nestini::CheckSpec) -> Result<Value, ValidationError> {
    let number: i64 = value
        .to_string()
        .parse()
        .map_err(|_| ValidationError::WrongType(value.to_string()))?;
    if number % 2 == 0 {
        Ok(Value::Integer(number))
    } else {
        Err(ValidationError::Custom(format!("{} is odd", number)))
    }
}

#[test]
fn test_custom_check() {
    let mut validator = Validator::new();
    validator.register("even", even);

    let mut config = config_with_spec("a = 4\nb = 5", "a = even\nb = even");
    let outcome = config
        .validate(&validator, ValidateOptions::default().with_preserve_errors(true))
        .unwrap();
    assert_eq!(config.root().value("a"), Some(&Value::Integer(4)));
    assert_eq!(
        outcome.get("b"),
        Some(&Outcome::Error(ValidationError::Custom("5 is odd".to_string())))
    );
}
