use crate::commands::{content, watch};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "posts",
            groups: content::EXAMPLES,
        },
        CommandExample {
            name: "like",
            groups: content::EXAMPLES,
        },
        CommandExample {
            name: "watch",
            groups: watch::EXAMPLES,
        },
    ]
}
