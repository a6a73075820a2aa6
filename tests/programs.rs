use jackc::{
    compile::{self, CodegenOptions},
    lex::LexOptions,
    source::Source,
    vm,
};

use runtime::{Machine, Program};

fn machine_with(classes: &[&str], codegen: CodegenOptions) -> Machine {
    let listings = classes.iter().enumerate().map(|(index, text)| {
        let source = Source::new(format!("Class{}.jack", index), text);
        let class = compile::compile_class(&source, LexOptions::default(), codegen).unwrap();

        let mut listing = Vec::new();
        vm::write(&class.code, &mut listing).unwrap();
        String::from_utf8(listing).unwrap()
    });

    Machine::new(Program::link(listings).unwrap())
}

fn machine(classes: &[&str]) -> Machine {
    machine_with(classes, CodegenOptions::default())
}

fn eval(expression: &str) -> i16 {
    let main = format!("class Main {{ function int main() {{ return {}; }} }}", expression);
    machine(&[main.as_str()]).call("Main.main", &[]).unwrap()
}

#[test]
fn prints_sum() {
    let mut machine = machine(&["class Main { function void main() { do Output.printInt(1+2); return; } }"]);

    assert_eq!(machine.call("Main.main", &[]), Ok(0));
    assert_eq!(machine.output(), "3");
}

#[test]
fn if_else_selects_branch() {
    let mut machine = machine(&["class Main {
        function int pick(boolean flag) {
            var int y;
            if (flag) { let y = 1; } else { let y = 2; }
            return y;
        }

        function int clamp(int x) {
            if (x > 10) { let x = 10; }
            return x;
        }
    }"]);

    assert_eq!(machine.call("Main.pick", &[-1]), Ok(1));
    assert_eq!(machine.call("Main.pick", &[0]), Ok(2));
    assert_eq!(machine.call("Main.clamp", &[42]), Ok(10));
    assert_eq!(machine.call("Main.clamp", &[7]), Ok(7));
}

#[test]
fn while_loop_and_recursion() {
    let mut machine = machine(&["class Main {
        function int sum(int n) {
            var int total, i;
            let i = 1;
            while (~(i > n)) {
                let total = total + i;
                let i = i + 1;
            }

            return total;
        }

        function int fib(int n) {
            if (n < 2) { return n; }
            return Main.fib(n - 1) + Main.fib(n - 2);
        }
    }"]);

    assert_eq!(machine.call("Main.sum", &[10]), Ok(55));
    assert_eq!(machine.call("Main.sum", &[0]), Ok(0));
    assert_eq!(machine.call("Main.fib", &[15]), Ok(610));
}

#[test]
fn operators_apply_left_to_right() {
    assert_eq!(eval("2 + 3 * 4"), 20);
    assert_eq!(eval("2 + (3 * 4)"), 14);
    assert_eq!(eval("(2 + 3) * 4 - 10 / 2"), 5);
    assert_eq!(eval("-7 / 2"), -3);
    assert_eq!(eval("~0"), -1);
    assert_eq!(eval("(1 < 2) & (3 = 3)"), -1);
    assert_eq!(eval("(1 > 2) | false"), 0);
}

#[test]
fn arrays() {
    let mut machine = machine(&["class Main {
        function int main() {
            var Array a;
            var int i, total;

            let a = Array.new(5);
            while (i < 5) {
                let a[i] = i * i;
                let i = i + 1;
            }

            let a[a[2]] = 7;
            let a[0] = a[1] + a[a[1]];

            let i = 0;
            while (i < 5) {
                let total = total + a[i];
                let i = i + 1;
            }

            return total;
        }
    }"]);

    // [2, 1, 4, 9, 7]
    assert_eq!(machine.call("Main.main", &[]), Ok(23));
}

#[test]
fn objects_and_methods() {
    let point = "class Point {
        field int x, y;
        static int instances;

        constructor Point new(int ax, int ay) {
            let x = ax;
            let y = ay;
            let instances = instances + 1;
            return this;
        }

        method int getX() { return x; }
        method int getY() { return y; }

        method Point plus(Point other) {
            return Point.new(x + other.getX(), y + other.getY());
        }

        method int sum() { return getX() + y; }

        function int instances() { return instances; }
    }";

    let main = "class Main {
        static Point origin;

        function int main() {
            var Point p, q;
            let origin = Point.new(0, 0);
            let p = Point.new(1, 2);
            let q = p.plus(Point.new(10, 20));
            return q.sum() + Point.instances();
        }
    }";

    let mut machine = machine(&[main, point]);
    assert_eq!(machine.call("Main.main", &[]), Ok(33 + 4));
}

#[test]
fn strings() {
    let mut machine = machine(&["class Main {
        function void main() {
            var String s;
            let s = \"Hi\";
            do Output.printString(s);
            do Output.printInt(String.length(s));
            do Output.printChar(33);
            do Output.printInt(-12);
            return;
        }
    }"]);

    assert_eq!(machine.call("Main.main", &[]), Ok(0));
    assert_eq!(machine.output(), "Hi2!-12");
}

#[test]
fn allocated_empty_string() {
    let main = "class Main {
        function int main() {
            do Output.printString(\"\");
            return String.length(\"\");
        }
    }";

    let mut machine = machine_with(&[main], CodegenOptions::ALLOCATE_EMPTY_STRINGS);
    assert_eq!(machine.call("Main.main", &[]), Ok(0));
    assert_eq!(machine.output(), "");
}

#[test]
fn shadowed_field() {
    let mut machine = machine(&["class Counter {
        field int value;

        constructor Counter new() { let value = 40; return this; }

        method int shadow() {
            var int value;
            let value = 2;
            return value;
        }

        method int get() { return value; }

        function int main() {
            var Counter c;
            let c = Counter.new();
            return c.shadow() + c.get();
        }
    }"]);

    assert_eq!(machine.call("Counter.main", &[]), Ok(42));
}
