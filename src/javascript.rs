use crate::block::Block;
use crate::generator::{
    comparison_operator, is_equality_token, is_identifier, quote_single, Emitter, Language, Order,
    RuleRegistry,
};
use crate::mutator::{ConditionalShape, ELSE_SOCKET};

pub mod order {
    use crate::generator::Order;

    pub const ATOMIC: Order = Order(0);
    pub const FUNCTION_CALL: Order = Order(20);
    pub const LOGICAL_NOT: Order = Order(44);
    pub const UNARY_NEGATION: Order = Order(45);
    pub const BITWISE_SHIFT: Order = Order(70);
    pub const RELATIONAL: Order = Order(80);
    pub const EQUALITY: Order = Order(90);
    pub const LOGICAL_AND: Order = Order(130);
    pub const LOGICAL_OR: Order = Order(140);
    pub const NONE: Order = Order(990);
}

pub const LANGUAGE: Language = Language {
    name: "javascript",
    indent: "  ",
    true_literal: "true",
    false_literal: "false",
    comment_prefix: "//",
    statement_terminator: ";",
    noop_statement: "",
};

pub fn registry() -> RuleRegistry {
    let mut r = RuleRegistry::new(LANGUAGE);
    r.statement("ottobit_start", |_, _| "start();\n".to_string())
        .statement("ottobit_move_forward", move_forward)
        .statement("ottobit_rotate", rotate)
        .statement("ottobit_move_backward", |_, _| "robot.moveBackward();\n".to_string())
        .statement("ottobit_turn_left", |_, _| "robot.turnLeft();\n".to_string())
        .statement("ottobit_turn_right", |_, _| "robot.turnRight();\n".to_string())
        .statement("ottobit_walk", walk)
        .statement("ottobit_dance", dance)
        .statement("ottobit_wait", wait)
        .statement("ottobit_repeat", repeat)
        .statement("ottobit_repeat_range", repeat_range)
        .statement("ottobit_while", while_loop)
        .statement("ottobit_while_compare", while_compare)
        .statement("ottobit_if", if_then)
        .statement("ottobit_if_condition", if_then)
        .statement("ottobit_if_else", if_else)
        .statement("ottobit_if_elseif_else", if_elseif_else)
        .statement("ottobit_if_expandable", if_expandable)
        .statement("ottobit_led_on", led_on)
        .statement("ottobit_led_off", |_, _| "robot.ledOff();\n".to_string())
        .statement("ottobit_buzzer_beep", buzzer_beep)
        .statement("ottobit_speak", |e, b| text_call(e, b, "robot.speak", "TEXT"))
        .statement("ottobit_display_text", |e, b| {
            text_call(e, b, "robot.displayText", "TEXT")
        })
        .statement("ottobit_send_message", |e, b| {
            text_call(e, b, "robot.sendMessage", "MESSAGE")
        })
        .statement("ottobit_collect_green", |e, b| collect(e, b, "collectGreen"))
        .statement("ottobit_collect_red", |e, b| collect(e, b, "collectRed"))
        .statement("ottobit_collect_yellow", |e, b| collect(e, b, "collectYellow"))
        .statement("ottobit_take_bale", |_, _| "takeBall();\n".to_string())
        .statement("ottobit_put_bale", |_, _| "putBall();\n".to_string())
        .statement("ottobit_function_def", function_def)
        .statement("ottobit_function_call", function_call)
        .expression("ottobit_number", number)
        .expression("ottobit_boolean", boolean)
        .expression("ottobit_variable", variable)
        .expression("ottobit_variable_i", variable)
        .expression("ottobit_read_sensor", read_sensor)
        .expression("ottobit_comparison", comparison)
        .expression("ottobit_logic_compare", logic_compare)
        .expression("ottobit_logic_operation", logic_operation)
        .expression("ottobit_logic_not", logic_not)
        .expression("ottobit_boolean_equals", boolean_equals)
        .expression("ottobit_condition", condition)
        .expression("ottobit_sensor_condition", sensor_condition)
        .expression("ottobit_touch_sensor", |_, _| call("robot.getTouchSensor()"))
        .expression("ottobit_light_sensor", |_, _| call("robot.getLightLevel()"))
        .expression("ottobit_sound_sensor", |_, _| call("robot.getSoundLevel()"))
        .expression("ottobit_bale_number", |_, _| call("getBaleNumber()"))
        .expression("ottobit_pin_number", |_, _| call("getPinNumber()"))
        .expression("ottobit_is_green", |_, _| call("isGreen()"))
        .expression("ottobit_is_red", |_, _| call("isRed()"))
        .expression("ottobit_is_yellow", |_, _| call("isYellow()"))
        .alias_prefix("ottobot_", "ottobit_");
    r
}

fn call(code: &str) -> (String, Order) {
    (code.to_string(), order::FUNCTION_CALL)
}

fn move_forward(e: &mut Emitter<'_>, block: &Block) -> String {
    let steps = e.arg(block, "STEPS", order::NONE, "1");
    format!("moveForward({});\n", steps)
}

fn rotate(_e: &mut Emitter<'_>, block: &Block) -> String {
    let action = match block.field_or("DIRECTION", "RIGHT").as_str() {
        "LEFT" => "turnLeft()",
        "BACK" => "turnBack()",
        _ => "turnRight()",
    };
    format!("{};\n", action)
}

fn walk(e: &mut Emitter<'_>, block: &Block) -> String {
    let steps = e.arg(block, "STEPS", order::NONE, "3");
    format!("robot.walk({});\n", steps)
}

fn dance(_e: &mut Emitter<'_>, block: &Block) -> String {
    let pattern = block.field_or("PATTERN", "basic");
    format!("robot.dance({});\n", quote_single(&pattern))
}

fn wait(e: &mut Emitter<'_>, block: &Block) -> String {
    let duration = e.arg(block, "DURATION", order::NONE, "1");
    format!("robot.wait({});\n", duration)
}

/// Loop frame understood by the simulator: `loopstep()` on every pass and
/// `loopend()` once the loop exits.
fn stepped_loop(header: &str, body: &str) -> String {
    format!("{} {{loopstep();\n{}}}\nloopend();\n", header, body)
}

fn repeat(e: &mut Emitter<'_>, block: &Block) -> String {
    let times = e.arg(block, "TIMES", order::BITWISE_SHIFT, "3");
    let body = e.statement_to_code(block, "DO");
    stepped_loop(&format!("for (let _i = 0; _i < {}; _i++)", times), &body)
}

fn repeat_range(e: &mut Emitter<'_>, block: &Block) -> String {
    let name = e.arg(block, "VAR", order::ATOMIC, "i");
    let var = if is_identifier(name.trim()) {
        name.trim().to_string()
    } else {
        "i".to_string()
    };
    let from = e.arg(block, "FROM", order::NONE, "1");
    let to = e.arg(block, "TO", order::BITWISE_SHIFT, "5");
    let by = e.arg(block, "BY", order::NONE, "1");
    let body = e.statement_to_code(block, "DO");
    let header = format!(
        "for ({v} = {}; {v} <= {}; {v} += {})",
        from,
        to,
        by,
        v = var
    );
    format!("var {};\n{}", var, stepped_loop(&header, &body))
}

fn while_loop(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let body = e.statement_to_code(block, "DO");
    stepped_loop(&format!("while ({})", condition), &body)
}

fn while_compare(e: &mut Emitter<'_>, block: &Block) -> String {
    let (test, _) = compare_sockets(e, block, "LEFT", "OPERATOR", "RIGHT");
    let body = e.statement_to_code(block, "DO");
    stepped_loop(&format!("while ({})", test), &body)
}

fn if_then(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let body = e.statement_to_code(block, "DO");
    format!("if ({}) {{\n{}}}\n", condition, body)
}

fn if_else(e: &mut Emitter<'_>, block: &Block) -> String {
    let condition = e.condition(block, "CONDITION");
    let then_body = e.statement_to_code(block, "DO");
    let else_body = e.statement_to_code(block, ELSE_SOCKET);
    format!(
        "if ({}) {{\n{}}} else {{\n{}}}\n",
        condition, then_body, else_body
    )
}

fn if_elseif_else(e: &mut Emitter<'_>, block: &Block) -> String {
    let first = e.condition(block, "CONDITION1");
    let first_body = e.statement_to_code(block, "DO1");
    let second = e.condition(block, "CONDITION2");
    let second_body = e.statement_to_code(block, "DO2");
    let else_body = e.statement_to_code(block, ELSE_SOCKET);
    format!(
        "if ({}) {{\n{}}} else if ({}) {{\n{}}} else {{\n{}}}\n",
        first, first_body, second, second_body, else_body
    )
}

fn if_expandable(e: &mut Emitter<'_>, block: &Block) -> String {
    let shape = ConditionalShape::of(block);
    let mut code = String::new();
    for i in 0..shape.pair_count() {
        let condition = e.condition(block, &ConditionalShape::condition_socket(i));
        let body = e.statement_to_code(block, &ConditionalShape::body_socket(i));
        if i > 0 {
            code.push_str(" else ");
        }
        code.push_str(&format!("if ({}) {{\n{}}}", condition, body));
    }
    if shape.has_else {
        let else_body = e.statement_to_code(block, ELSE_SOCKET);
        if !else_body.trim().is_empty() {
            code.push_str(&format!(" else {{\n{}}}", else_body));
        }
    }
    code.push('\n');
    code
}

fn led_on(_e: &mut Emitter<'_>, block: &Block) -> String {
    let color = block.field_or("COLOR", "red");
    format!("robot.ledOn({});\n", quote_single(&color))
}

fn buzzer_beep(e: &mut Emitter<'_>, block: &Block) -> String {
    let frequency = e.arg(block, "FREQUENCY", order::NONE, "1000");
    let duration = e.arg(block, "DURATION", order::NONE, "1");
    format!("robot.beep({}, {});\n", frequency, duration)
}

fn text_call(_e: &mut Emitter<'_>, block: &Block, function: &str, field: &str) -> String {
    let text = block.field_or(field, "Hello");
    format!("{}({});\n", function, quote_single(&text))
}

fn collect(e: &mut Emitter<'_>, block: &Block, function: &str) -> String {
    let count = e.arg(block, "COUNT", order::NONE, "1");
    format!("{}({});\n", function, count)
}

fn function_name(block: &Block) -> String {
    let name = block.field_or("NAME", "myFunction");
    if is_identifier(&name) {
        name
    } else {
        "myFunction".to_string()
    }
}

fn function_def(e: &mut Emitter<'_>, block: &Block) -> String {
    let name = function_name(block);
    let body = e.statement_to_code(block, "STACK");
    format!("function {}() {{\n{}}}\n", name, body)
}

fn function_call(_e: &mut Emitter<'_>, block: &Block) -> String {
    format!("{}();\n", function_name(block))
}

fn number(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let value = block.field_or("NUM", "0");
    let order = if value.starts_with('-') {
        order::UNARY_NEGATION
    } else {
        order::ATOMIC
    };
    (value, order)
}

fn boolean(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let literal = if block.field_or("BOOL", "TRUE") == "TRUE" {
        LANGUAGE.true_literal
    } else {
        LANGUAGE.false_literal
    };
    (literal.to_string(), order::ATOMIC)
}

fn variable(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    (block.field_or("VAR", "i"), order::ATOMIC)
}

fn read_sensor(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let sensor = block.field_or("SENSOR_TYPE", "DISTANCE");
    call(&format!("readSensor({})", quote_single(&sensor)))
}

/// Equality and relational operators sit at different levels in JavaScript,
/// so the operand slot and result order depend on the operator.
fn compare_sockets(
    e: &mut Emitter<'_>,
    block: &Block,
    left: &str,
    op_field: &str,
    right: &str,
) -> (String, Order) {
    let token = block.field_or(op_field, "EQ");
    let (operand, result) = if is_equality_token(&token) {
        (order::RELATIONAL, order::EQUALITY)
    } else {
        (order::BITWISE_SHIFT, order::RELATIONAL)
    };
    let left = e.arg(block, left, operand, "0");
    let right = e.arg(block, right, operand, "0");
    (
        format!("{} {} {}", left, comparison_operator(&token), right),
        result,
    )
}

fn comparison(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    compare_sockets(e, block, "A", "OP", "B")
}

fn logic_compare(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    compare_sockets(e, block, "LEFT", "OPERATOR", "RIGHT")
}

fn logic_operation(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let (op, order) = match block.field_or("OP", "AND").as_str() {
        "OR" => ("||", order::LOGICAL_OR),
        _ => ("&&", order::LOGICAL_AND),
    };
    let left = e.value_or(block, "LEFT", order, LANGUAGE.false_literal);
    let right = e.value_or(block, "RIGHT", order, LANGUAGE.false_literal);
    (format!("{} {} {}", left, op, right), order)
}

fn logic_not(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let value = e.value_or(block, "BOOL", order::LOGICAL_NOT, LANGUAGE.true_literal);
    (format!("!{}", value), order::LOGICAL_NOT)
}

fn boolean_equals(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let left = e.value_or(block, "LEFT", order::RELATIONAL, LANGUAGE.false_literal);
    let right = e.value_or(block, "RIGHT", order::RELATIONAL, LANGUAGE.false_literal);
    (format!("{} === {}", left, right), order::EQUALITY)
}

fn condition(e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    (e.condition(block, "CONDITION"), order::NONE)
}

fn sensor_condition(_e: &mut Emitter<'_>, block: &Block) -> (String, Order) {
    let sensor = match block.field_or("SENSOR_TYPE", "DISTANCE").as_str() {
        "LIGHT" => "readSensor('LIGHT')",
        "TEMPERATURE" => "readSensor('TEMPERATURE')",
        "BALE_NUMBER" => "getBaleNumber()",
        _ => "readSensor('DISTANCE')",
    };
    let token = block.field_or("OP", "EQ");
    let value = block.field_or("VALUE", "0");
    let order = if is_equality_token(&token) {
        order::EQUALITY
    } else {
        order::RELATIONAL
    };
    (
        format!("{} {} {}", sensor, comparison_operator(&token), value),
        order,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Workspace;
    use crate::mutator;

    fn gen(top: Vec<Block>) -> String {
        registry().generate(&Workspace::new(top))
    }

    fn forward(steps: i64) -> Block {
        Block::new("ottobit_move_forward").with_field("STEPS", steps)
    }

    #[test]
    fn empty_condition_uses_the_false_literal() {
        let program = forward(2).with_next(Block::new("ottobit_if").with_input("DO", forward(1)));
        assert_eq!(
            gen(vec![program]),
            "moveForward(2);\nif (false) {\n  moveForward(1);\n}\n"
        );
    }

    #[test]
    fn loops_are_wrapped_with_step_hooks() {
        let program = Block::new("ottobit_start").with_next(
            Block::new("ottobit_repeat")
                .with_field("TIMES", 2)
                .with_input("DO", Block::new("ottobit_rotate").with_field("DIRECTION", "BACK")),
        );
        assert_eq!(
            gen(vec![program]),
            "start();\nfor (let _i = 0; _i < 2; _i++) {loopstep();\n  turnBack();\n}\nloopend();\n"
        );
    }

    #[test]
    fn repeat_range_declares_its_variable() {
        let block = Block::new("ottobit_repeat_range")
            .with_field("VAR", "n")
            .with_field("FROM", 2)
            .with_field("TO", 8)
            .with_field("BY", 2)
            .with_input("DO", Block::new("ottobit_collect_red").with_field("COUNT", 1));
        assert_eq!(
            gen(vec![block]),
            "var n;\nfor (n = 2; n <= 8; n += 2) {loopstep();\n  collectRed(1);\n}\nloopend();\n"
        );
    }

    #[test]
    fn comparisons_in_loop_bounds_are_parenthesized() {
        let bale_check = || {
            Block::new("ottobit_logic_compare")
                .with_field("OPERATOR", "LT")
                .with_input("LEFT", Block::new("ottobit_bale_number"))
                .with_input("RIGHT", Block::new("ottobit_number").with_field("NUM", 3))
        };
        let repeat = Block::new("ottobit_repeat").with_input("TIMES", bale_check());
        assert_eq!(
            gen(vec![repeat]),
            "for (let _i = 0; _i < (getBaleNumber() < 3); _i++) {loopstep();\n}\nloopend();\n"
        );
        let range = Block::new("ottobit_repeat_range").with_input("TO", bale_check());
        assert_eq!(
            gen(vec![range]),
            "var i;\nfor (i = 1; i <= (getBaleNumber() < 3); i += 1) {loopstep();\n}\nloopend();\n"
        );
    }

    #[test]
    fn expandable_if_chains_else_if_and_omits_an_empty_else() {
        let mut block = Block::new("ottobit_if_expandable")
            .with_input("IF0", Block::new("ottobit_is_green"))
            .with_input("DO0", Block::new("ottobit_collect_green"));
        mutator::apply(&mut block, ConditionalShape::new(1, true));
        block.set_input("IF1", Some(Block::new("ottobit_is_red")));
        block.set_input("DO1", Some(Block::new("ottobit_collect_red")));
        assert_eq!(
            gen(vec![block]),
            "if (isGreen()) {\n  collectGreen(1);\n} else if (isRed()) {\n  collectRed(1);\n}\n"
        );
    }

    #[test]
    fn equality_and_relational_operands_are_grouped() {
        let lt = Block::new("ottobit_logic_compare")
            .with_field("OPERATOR", "LT")
            .with_input("LEFT", Block::new("ottobit_bale_number"))
            .with_input("RIGHT", Block::new("ottobit_number").with_field("NUM", 3));
        let eq = Block::new("ottobit_boolean_equals")
            .with_input("LEFT", lt)
            .with_input("RIGHT", Block::new("ottobit_boolean").with_field("BOOL", "FALSE"));
        let not = Block::new("ottobit_logic_not").with_input("BOOL", eq);
        let program = Block::new("ottobit_while").with_input("CONDITION", not);
        assert_eq!(
            gen(vec![program]),
            "while (!(getBaleNumber() < 3 === false)) {loopstep();\n}\nloopend();\n"
        );
    }

    #[test]
    fn logic_operations_use_symbols() {
        let or = Block::new("ottobit_logic_operation")
            .with_field("OP", "OR")
            .with_input("LEFT", Block::new("ottobit_is_red"))
            .with_input("RIGHT", Block::new("ottobit_touch_sensor"));
        let and = Block::new("ottobit_logic_operation")
            .with_input("LEFT", Block::new("ottobit_is_green"))
            .with_input("RIGHT", or);
        let program = Block::new("ottobit_if").with_input("CONDITION", and);
        assert_eq!(
            gen(vec![program]),
            "if (isGreen() && (isRed() || robot.getTouchSensor())) {\n}\n"
        );
    }

    #[test]
    fn functions_and_unknown_blocks() {
        let def = Block::new("ottobit_function_def")
            .with_field("NAME", "drop")
            .with_input("STACK", Block::new("ottobit_put_bale"));
        let call = Block::new("ottobit_function_call")
            .with_field("NAME", "drop")
            .with_next(Block::new("ottobit_fly"));
        assert_eq!(
            gen(vec![def, call]),
            "function drop() {\n  putBall();\n}\n\ndrop();\n// unknown block: ottobit_fly\n"
        );
    }
}
