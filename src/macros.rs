macro_rules! emit {
    ($context:expr, $($instruction:expr),+ $(,)?) => {{
        $($context.output.push($instruction);)+
    }};
}
